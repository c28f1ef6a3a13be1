//! Incremental list controller.
//!
//! A synchronous state machine that decides *when* a page should be fetched and
//! how results are folded into the accumulated list. It never performs I/O:
//! every transition that needs data hands back a [`PageTicket`], the caller runs
//! the fetch (see [`fetch_next`]) and feeds the outcome to [`ListController::apply`].
//!
//! ```text
//! Idle ──load_more / scroll*──▶ LoadingMore ──ok──▶ Idle | Exhausted
//!  ▲                                  │
//!  └──mount / set_filter──▶ LoadingInitial ──err──▶ Error ──retry──▶ Loading*
//! ```
//! `*` scroll-proximity only loads after the first explicit `load_more`.

use async_trait::async_trait;
use log::debug;
use std::collections::HashSet;

use crate::error::ServiceError;
use crate::query_service::{ListQuery, Page, QueryService};
use crate::types::{PokemonEntity, RegionalDexEntry};

/// Items the controller can deduplicate.
pub trait ListItem {
    fn item_id(&self) -> u32;
}

impl ListItem for PokemonEntity {
    fn item_id(&self) -> u32 {
        self.id
    }
}

impl ListItem for RegionalDexEntry {
    fn item_id(&self) -> u32 {
        self.dex_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListState {
    Idle,
    LoadingInitial,
    LoadingMore,
    Exhausted,
    /// Recoverable through [`ListController::retry`].
    Error(ServiceError),
}

impl ListState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ListState::LoadingInitial | ListState::LoadingMore)
    }
}

/// One outstanding page request. `generation` ties it to the filter it was
/// issued under; results for an older generation are dropped on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    pub generation: u64,
    pub offset: usize,
    pub limit: usize,
    pub initial: bool,
}

pub struct ListController<F, T> {
    filter: F,
    page_size: usize,
    items: Vec<T>,
    seen: HashSet<u32>,
    next_offset: usize,
    total: Option<usize>,
    state: ListState,
    generation: u64,
    auto_load_armed: bool,
    pending: Option<PageTicket>,
    failed: Option<PageTicket>,
}

impl<F, T: ListItem> ListController<F, T> {
    pub fn new(filter: F, page_size: usize) -> Self {
        Self {
            filter,
            page_size: page_size.max(1),
            items: Vec::new(),
            seen: HashSet::new(),
            next_offset: 0,
            total: None,
            state: ListState::Idle,
            generation: 0,
            auto_load_armed: false,
            pending: None,
            failed: None,
        }
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pending(&self) -> Option<PageTicket> {
        self.pending
    }

    /// First load. Same as a filter reset without changing the filter.
    pub fn mount(&mut self) -> PageTicket {
        self.restart()
    }

    /// Replaces the filter, drops accumulated items and starts over at offset 0.
    /// Any request still in flight becomes stale.
    pub fn set_filter(&mut self, filter: F) -> PageTicket {
        self.filter = filter;
        self.restart()
    }

    fn restart(&mut self) -> PageTicket {
        self.generation += 1;
        self.items.clear();
        self.seen.clear();
        self.next_offset = 0;
        self.total = None;
        self.auto_load_armed = false;
        self.failed = None;
        self.state = ListState::LoadingInitial;
        self.issue(true)
    }

    fn issue(&mut self, initial: bool) -> PageTicket {
        let ticket = PageTicket {
            generation: self.generation,
            offset: if initial { 0 } else { self.next_offset },
            limit: self.page_size,
            initial,
        };
        self.pending = Some(ticket);
        ticket
    }

    /// Explicit "load more". No-op unless idle.
    pub fn load_more(&mut self) -> Option<PageTicket> {
        if self.state != ListState::Idle {
            debug!("load_more ignored in state {:?}", self.state);
            return None;
        }
        self.auto_load_armed = true;
        self.state = ListState::LoadingMore;
        Some(self.issue(false))
    }

    /// Scroll-proximity signal. Ignored until the first explicit `load_more`.
    pub fn on_scroll_near_end(&mut self) -> Option<PageTicket> {
        if !self.auto_load_armed {
            return None;
        }
        self.load_more()
    }

    /// Re-issues the request that failed.
    pub fn retry(&mut self) -> Option<PageTicket> {
        if !matches!(self.state, ListState::Error(_)) {
            return None;
        }
        let failed = self.failed.take()?;
        self.state = if failed.initial {
            ListState::LoadingInitial
        } else {
            ListState::LoadingMore
        };
        let ticket = PageTicket {
            generation: self.generation,
            ..failed
        };
        self.pending = Some(ticket);
        Some(ticket)
    }

    /// Folds a fetch outcome into the list. Returns `false` when the ticket is
    /// stale (superseded filter or not the outstanding request).
    pub fn apply(&mut self, ticket: PageTicket, result: Result<Page<T>, ServiceError>) -> bool {
        if ticket.generation != self.generation || self.pending != Some(ticket) {
            debug!(
                "Discarding stale page (generation {} vs {})",
                ticket.generation, self.generation
            );
            return false;
        }
        self.pending = None;

        match result {
            Ok(page) => {
                if ticket.initial {
                    self.items.clear();
                    self.seen.clear();
                }
                for item in page.items {
                    if self.seen.insert(item.item_id()) {
                        self.items.push(item);
                    }
                }
                self.next_offset = ticket.offset + ticket.limit;
                self.total = Some(page.total);
                self.state = if self.next_offset >= page.total {
                    ListState::Exhausted
                } else {
                    ListState::Idle
                };
            }
            Err(e) => {
                self.failed = Some(ticket);
                self.state = ListState::Error(e);
            }
        }
        true
    }
}

/// Anything that can serve a page for filter `F`.
#[async_trait]
pub trait PageSource<F: Sync, T: Send>: Send + Sync {
    async fn fetch_page(&self, filter: &F, offset: usize, limit: usize) -> Result<Page<T>, ServiceError>;
}

#[async_trait]
impl PageSource<ListQuery, PokemonEntity> for QueryService {
    async fn fetch_page(
        &self,
        filter: &ListQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PokemonEntity>, ServiceError> {
        let query = ListQuery {
            limit: limit as i64,
            offset: offset as i64,
            ..filter.clone()
        };
        self.list(&query).await
    }
}

/// Runs `ticket` against `source` and applies the outcome.
pub async fn fetch_next<F, T, S>(
    controller: &mut ListController<F, T>,
    source: &S,
    ticket: PageTicket,
) -> bool
where
    F: Sync,
    T: ListItem + Send,
    S: PageSource<F, T> + ?Sized,
{
    let result = source
        .fetch_page(controller.filter(), ticket.offset, ticket.limit)
        .await;
    controller.apply(ticket, result)
}
