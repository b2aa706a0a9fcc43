//! In-memory comment log per room.

use crate::domain::comment::{CommentPage, CommentRecord};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Comments shown per page.
pub const PAGE_SIZE: usize = 100;

/// Default number of comments retained per room.
pub const DEFAULT_ROOM_CAPACITY: usize = 10_000;

/// Default number of rooms kept at once.
pub const DEFAULT_MAX_ROOMS: usize = 1_000;

/// Per-room comment log.
///
/// Rooms are independent; posting to one never blocks reads of another.
/// Each room keeps at most `capacity` comments, dropping the oldest. Room
/// names come from the request path, so the number of rooms is capped too:
/// opening a room past `max_rooms` drops the room that has been quiet longest.
/// Concurrent first posts may briefly overshoot the cap.
#[derive(Debug, Clone)]
pub struct CommentBoard {
    rooms: Arc<DashMap<String, VecDeque<CommentRecord>>>,
    capacity: usize,
    max_rooms: usize,
}

impl Default for CommentBoard {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl CommentBoard {
    /// Create a board retaining up to `capacity` comments per room.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            max_rooms: DEFAULT_MAX_ROOMS,
        }
    }

    /// Keep at most `max_rooms` rooms.
    pub fn with_max_rooms(mut self, max_rooms: usize) -> Self {
        self.max_rooms = max_rooms.max(1);
        self
    }

    /// Number of rooms holding comments.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Append a comment to a room.
    pub fn post(&self, room: &str, record: CommentRecord) {
        if !self.rooms.contains_key(room) && self.rooms.len() >= self.max_rooms {
            self.evict_quietest_room();
        }
        let mut log = self.rooms.entry(room.to_string()).or_default();
        if log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(record);
    }

    fn evict_quietest_room(&self) {
        let quietest = self
            .rooms
            .iter()
            .map(|entry| (entry.value().back().map(|c| c.created_at), entry.key().clone()))
            .min();
        if let Some((_, room)) = quietest {
            self.rooms.remove(&room);
            debug!(%room, "quietest comment room dropped");
        }
    }

    /// Number of comments in a room.
    pub fn count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|log| log.len()).unwrap_or(0)
    }

    /// One page of a room, newest first.
    ///
    /// `page` is 1-based and clamped to `[1, total_pages]`; an empty room has
    /// one empty page.
    pub fn page(&self, room: &str, page: usize) -> CommentPage {
        let Some(log) = self.rooms.get(room) else {
            return CommentPage {
                comments: Vec::new(),
                current_page: 1,
                total_pages: 1,
            };
        };

        let total_pages = log.len().div_ceil(PAGE_SIZE).max(1);
        let current_page = page.clamp(1, total_pages);
        let comments = log
            .iter()
            .rev()
            .skip((current_page - 1) * PAGE_SIZE)
            .take(PAGE_SIZE)
            .cloned()
            .collect();

        CommentPage {
            comments,
            current_page,
            total_pages,
        }
    }
}
