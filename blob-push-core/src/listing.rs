//! Container listing as a lazy stream over the store's paginated API.

use std::collections::HashSet;

use futures::stream::{self, Stream, TryStreamExt};
use tracing::debug;

use crate::contract::{BlobStore, RemoteObject};
use crate::error::ListingError;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Paging state: where to resume, plus every marker handed out so far.
struct Pager {
    cursor: Cursor,
    seen: HashSet<String>,
}

/// Stream every object in the store's container, one page at a time.
///
/// Pages are requested only as the stream is polled, so memory stays bounded by one page.
/// The stream ends when the store reports no continuation marker; a marker the store has
/// already returned (which would loop the listing) ends it with
/// [`ListingError::StalledMarker`].
pub fn list_all<'a>(
    store: &'a dyn BlobStore,
    page_size: usize,
) -> impl Stream<Item = Result<RemoteObject, ListingError>> + Send + 'a {
    let pager = Pager {
        cursor: Cursor::Start,
        seen: HashSet::new(),
    };
    stream::try_unfold(pager, move |pager| fetch_page(store, pager, page_size))
        .map_ok(|objects| stream::iter(objects.into_iter().map(Ok)))
        .try_flatten()
}

async fn fetch_page(
    store: &dyn BlobStore,
    mut pager: Pager,
    page_size: usize,
) -> Result<Option<(Vec<RemoteObject>, Pager)>, ListingError> {
    let marker = match pager.cursor {
        Cursor::Done => return Ok(None),
        Cursor::Start => None,
        Cursor::Next(marker) => Some(marker),
    };

    let page = store.list_objects(marker, page_size).await?;
    debug!(
        objects = page.objects.len(),
        has_more = page.next_marker.is_some(),
        "Fetched listing page"
    );

    pager.cursor = match page.next_marker {
        None => Cursor::Done,
        Some(next) if !pager.seen.insert(next.clone()) => {
            return Err(ListingError::StalledMarker(next));
        }
        Some(next) => Cursor::Next(next),
    };
    Ok(Some((page.objects, pager)))
}
