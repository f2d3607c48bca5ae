//! Pagination state for one feed.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use parley_shared::types::RoomId;
use parley_store::{MessageQuery, SortOrder};

/// How a feed is consumed.
///
/// Chat feeds show the newest messages at the bottom and page towards older
/// history on scroll-up. Comment feeds show the oldest first and page towards
/// newer messages on scroll-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    Chat,
    Comment,
}

impl FeedMode {
    pub fn sort_order(self) -> SortOrder {
        match self {
            Self::Chat => SortOrder::Descending,
            Self::Comment => SortOrder::Ascending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Comment => "comment",
        }
    }
}

impl FromStr for FeedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "comment" | "comments" => Ok(Self::Comment),
            other => Err(format!("unknown feed mode: {other}")),
        }
    }
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issued pagination request.
///
/// Tickets are numbered in issue order so a response can be recognised as
/// stale once a newer request has gone out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    seq: u64,
    query: MessageQuery,
    prior_skip: usize,
}

impl PageTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn query(&self) -> &MessageQuery {
        &self.query
    }
}

#[derive(Debug, Clone)]
pub struct PageCursor {
    room: RoomId,
    limit: usize,
    mode: FeedMode,
    skip: usize,
    issued: u64,
}

impl PageCursor {
    pub fn new(room: RoomId, limit: usize, mode: FeedMode) -> Self {
        Self {
            room,
            limit,
            mode,
            skip: 0,
            issued: 0,
        }
    }

    /// Query for the first page: no skip.
    pub fn initial_query(&self) -> MessageQuery {
        MessageQuery::new(self.room.clone(), self.limit, self.mode.sort_order())
    }

    /// Move the cursor past the `loaded` messages already in memory and issue
    /// the query for the next page. The skip never moves backwards here; only
    /// [`rollback`](Self::rollback) lowers it.
    pub fn advance(&mut self, loaded: usize) -> PageTicket {
        let prior_skip = self.skip;
        self.skip = self.skip.max(loaded);
        self.issued += 1;

        PageTicket {
            seq: self.issued,
            query: self.initial_query().with_skip(self.skip),
            prior_skip,
        }
    }

    /// Whether `ticket` is the most recently issued request.
    pub fn is_latest(&self, ticket: &PageTicket) -> bool {
        ticket.seq == self.issued
    }

    /// Undo the skip advance of a failed request. Only the latest request can
    /// be rolled back; returns whether the cursor changed.
    pub fn rollback(&mut self, ticket: &PageTicket) -> bool {
        if !self.is_latest(ticket) {
            return false;
        }
        self.skip = ticket.prior_skip;
        true
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn order(&self) -> SortOrder {
        self.mode.sort_order()
    }

    pub fn skip(&self) -> usize {
        self.skip
    }
}
