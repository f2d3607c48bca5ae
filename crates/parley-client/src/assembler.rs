//! The in-memory message sequence of one feed.
//!
//! [`FeedAssembler`] merges historical pages and live events into a single
//! sequence kept in display order (oldest at the top, newest at the bottom)
//! whatever order the store returned the pages in.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use parley_shared::types::{Comment, Message, MessageId};

use crate::cursor::FeedMode;
use crate::error::{FeedError, Result};

/// Messages loaded so far plus the server-side total they are drawn from.
///
/// `messages.len() <= total` always holds: a page longer than the known
/// total means the room grew since it was counted, and the total is raised to
/// match. Once every message has been loaded the exhausted flag stays set for
/// the lifetime of the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedState {
    messages: Vec<Message>,
    total: usize,
    exhausted: bool,
}

impl FeedState {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn recompute_exhausted(&mut self) {
        if self.messages.len() == self.total {
            self.exhausted = true;
        }
    }
}

#[derive(Debug)]
pub struct FeedAssembler {
    mode: FeedMode,
    state: FeedState,
    initialized: bool,
    /// The first page outgrew the count and the total was raised to cover it.
    first_page_recounted: bool,
}

impl FeedAssembler {
    pub fn new(mode: FeedMode) -> Self {
        Self {
            mode,
            state: FeedState::default(),
            initialized: false,
            first_page_recounted: false,
        }
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.state.messages()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.state.messages.iter().any(|m| &m.id == id)
    }

    /// Install the first page. Chat pages arrive newest first and are
    /// reversed into display order; comment pages are kept as fetched.
    pub fn initialize(&mut self, mut total: usize, mut page: Vec<Message>) -> Result<()> {
        if self.initialized {
            return Err(FeedError::InvalidState("feed already initialized"));
        }
        if page.len() > total {
            debug!(counted = total, page = page.len(), "First page outgrew the count, raising total");
            total = page.len();
            self.first_page_recounted = true;
        }

        if self.mode == FeedMode::Chat {
            page.reverse();
        }

        self.state = FeedState {
            messages: page,
            total,
            exhausted: false,
        };
        self.state.recompute_exhausted();
        self.initialized = true;

        debug!(
            mode = %self.mode,
            total,
            loaded = self.state.len(),
            exhausted = self.state.exhausted,
            "Feed initialized"
        );
        Ok(())
    }

    /// Chat mode, scroll-up: put an older page (newest first) in front of the
    /// loaded messages. Returns how many messages were added.
    pub fn append_older_page(&mut self, page: Vec<Message>) -> Result<usize> {
        self.expect_mode(FeedMode::Chat, "older pages only apply to chat feeds")?;
        let mut page = match self.accept_page(page)? {
            Some(page) => page,
            None => return Ok(0),
        };

        page.reverse();
        let added = page.len();
        self.state.messages.splice(0..0, page);
        self.state.recompute_exhausted();
        Ok(added)
    }

    /// Comment mode, scroll-down: put a newer page (oldest first) after the
    /// loaded messages. Returns how many messages were added.
    pub fn append_newer_page(&mut self, page: Vec<Message>) -> Result<usize> {
        self.expect_mode(FeedMode::Comment, "newer pages only apply to comment feeds")?;
        let page = match self.accept_page(page)? {
            Some(page) => page,
            None => return Ok(0),
        };

        let added = page.len();
        self.state.messages.extend(page);
        self.state.recompute_exhausted();
        Ok(added)
    }

    /// Append a page in the direction this feed paginates.
    pub fn append_page(&mut self, page: Vec<Message>) -> Result<usize> {
        match self.mode {
            FeedMode::Chat => self.append_older_page(page),
            FeedMode::Comment => self.append_newer_page(page),
        }
    }

    /// A live top-level message always goes to the back. The room gained a
    /// message, so the total grows with it.
    pub fn ingest_live_top_level(&mut self, message: Message) -> Result<()> {
        self.expect_initialized()?;
        self.state.messages.push(message);
        self.state.total += 1;
        self.state.recompute_exhausted();
        Ok(())
    }

    /// A live message that turned out to be on the first page already was
    /// posted after the room was counted, unless the first page itself raised
    /// the total. Count it in that case.
    pub fn count_loaded_arrival(&mut self) -> Result<()> {
        self.expect_initialized()?;
        if !self.first_page_recounted {
            self.state.total += 1;
        }
        Ok(())
    }

    /// Attach a live comment to its parent. Comments whose parent is not
    /// loaded are dropped; returns whether the comment was attached.
    pub fn ingest_live_comment(&mut self, parent: &MessageId, comment: Comment) -> Result<bool> {
        self.expect_initialized()?;
        match self.state.messages.iter_mut().find(|m| &m.id == parent) {
            Some(message) => {
                message.comments.push(comment);
                Ok(true)
            }
            None => {
                debug!(parent = %parent, comment = %comment.id, "Parent not loaded, dropping comment");
                Ok(false)
            }
        }
    }

    fn expect_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(FeedError::InvalidState("feed not initialized"))
        }
    }

    fn expect_mode(&self, mode: FeedMode, reason: &'static str) -> Result<()> {
        self.expect_initialized()?;
        if self.mode == mode {
            Ok(())
        } else {
            Err(FeedError::InvalidState(reason))
        }
    }

    /// Validate a fetched page against the current state. Messages already
    /// loaded (e.g. live arrivals that shifted the page window) are dropped.
    /// `None` means there is nothing to add.
    fn accept_page(&mut self, page: Vec<Message>) -> Result<Option<Vec<Message>>> {
        if page.is_empty() {
            return Ok(None);
        }
        if self.state.exhausted {
            return Err(FeedError::Exhausted {
                total: self.state.total,
            });
        }

        let loaded: HashSet<&MessageId> = self.state.messages.iter().map(|m| &m.id).collect();
        let fetched = page.len();
        let page: Vec<Message> = page.into_iter().filter(|m| !loaded.contains(&m.id)).collect();
        if page.len() < fetched {
            debug!(
                duplicates = fetched - page.len(),
                "Dropped already-loaded messages from page"
            );
        }
        if page.is_empty() {
            return Ok(None);
        }

        let needed = self.state.len() + page.len();
        if needed > self.state.total {
            debug!(
                total = self.state.total,
                needed,
                "Page outgrew the known total, raising total"
            );
            self.state.total = needed;
        }
        Ok(Some(page))
    }
}
