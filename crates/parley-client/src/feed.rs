//! The feed driver: one tokio task that owns a room's [`FeedAssembler`].
//!
//! The driver subscribes to the room before the first fetch goes out so no
//! live event is missed. Store fetches run as separate tasks and report back
//! on an internal queue; the driver applies their results, live events and
//! handle commands one at a time, so all mutation happens in a single place.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use parley_net::EventChannel;
use parley_shared::identity::IdentityProvider;
use parley_shared::protocol::LiveEvent;
use parley_shared::types::{Message, RoomId};
use parley_store::{MessageQuery, MessageStore};

use crate::assembler::FeedAssembler;
use crate::config::FeedConfig;
use crate::cursor::{FeedMode, PageCursor, PageTicket};
use crate::error::{FeedError, Result};
use crate::events::{emit_update, FeedUpdate, FetchStage};
use crate::identity::ChatIdentity;
use crate::router::{LiveEventRouter, RouteOutcome};

const COMMAND_BUFFER: usize = 64;
const FETCH_BUFFER: usize = 16;

/// Point-in-time copy of a feed's state.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub room: RoomId,
    pub mode: FeedMode,
    pub messages: Vec<Message>,
    pub total: usize,
    pub exhausted: bool,
    pub initialized: bool,
    pub chat_name: Option<String>,
    /// Current pagination skip.
    pub skip: usize,
    /// Whether the live subscription is still open.
    pub live: bool,
    pub buffered_events: usize,
}

#[derive(Debug)]
enum FeedCommand {
    LoadMore,
    Reload,
    Snapshot(oneshot::Sender<FeedSnapshot>),
    Shutdown,
}

enum FetchOutcome {
    Initial(Result<(usize, Vec<Message>)>),
    Page {
        ticket: PageTicket,
        result: Result<Vec<Message>>,
    },
}

/// Cloneable handle to a running feed. The feed stops once every handle is
/// dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    room: RoomId,
    mode: FeedMode,
    cmd_tx: mpsc::Sender<FeedCommand>,
}

impl FeedHandle {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    /// Request the next page in the feed's paging direction. Ignored until
    /// the feed is initialized and once it is exhausted.
    pub async fn load_more(&self) -> Result<()> {
        self.send(FeedCommand::LoadMore).await
    }

    pub async fn scroll_up(&self) -> Result<()> {
        if self.mode != FeedMode::Chat {
            return Err(FeedError::InvalidState("scroll up only pages chat feeds"));
        }
        self.load_more().await
    }

    pub async fn scroll_down(&self) -> Result<()> {
        if self.mode != FeedMode::Comment {
            return Err(FeedError::InvalidState("scroll down only pages comment feeds"));
        }
        self.load_more().await
    }

    /// Retry the initial fetch after it failed.
    pub async fn reload(&self) -> Result<()> {
        self.send(FeedCommand::Reload).await
    }

    pub async fn snapshot(&self) -> Result<FeedSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(FeedCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| FeedError::Stopped)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(FeedCommand::Shutdown).await
    }

    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    async fn send(&self, cmd: FeedCommand) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| FeedError::Stopped)
    }
}

/// Start a feed for `config.room`.
///
/// Returns once the live subscription is open; the first page is fetched in
/// the background and announced with [`FeedUpdate::Initialized`].
pub async fn spawn_feed(
    config: FeedConfig,
    store: Arc<dyn MessageStore>,
    channel: Arc<dyn EventChannel>,
    identity: Arc<dyn IdentityProvider>,
) -> Result<(FeedHandle, mpsc::Receiver<FeedUpdate>)> {
    config.validate()?;

    let mut router = LiveEventRouter::new(config.max_buffered_events);
    router.connect(channel.as_ref(), &config.room).await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (fetch_tx, fetch_rx) = mpsc::channel(FETCH_BUFFER);
    let (update_tx, update_rx) = mpsc::channel(config.update_capacity);

    let handle = FeedHandle {
        room: config.room.clone(),
        mode: config.mode,
        cmd_tx,
    };

    info!(room = %config.room, mode = %config.mode, limit = config.limit, "Starting feed");

    let driver = FeedDriver {
        cursor: PageCursor::new(config.room.clone(), config.limit, config.mode),
        assembler: FeedAssembler::new(config.mode),
        router,
        config,
        store,
        identity,
        chat_name: None,
        initial_in_flight: false,
        fetch_tx,
        updates: update_tx,
    };
    tokio::spawn(driver.run(cmd_rx, fetch_rx));

    Ok((handle, update_rx))
}

struct FeedDriver {
    config: FeedConfig,
    store: Arc<dyn MessageStore>,
    identity: Arc<dyn IdentityProvider>,
    cursor: PageCursor,
    assembler: FeedAssembler,
    router: LiveEventRouter,
    chat_name: Option<String>,
    initial_in_flight: bool,
    fetch_tx: mpsc::Sender<FetchOutcome>,
    updates: mpsc::Sender<FeedUpdate>,
}

impl FeedDriver {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<FeedCommand>,
        mut fetch_rx: mpsc::Receiver<FetchOutcome>,
    ) {
        self.start_initial_fetch();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(FeedCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(outcome) = fetch_rx.recv() => self.handle_fetch(outcome),
                event = self.router.next_event() => self.handle_live(event),
            }
        }

        self.router.release();
        info!(room = %self.config.room, "Feed stopped");
    }

    fn handle_command(&mut self, cmd: FeedCommand) {
        match cmd {
            FeedCommand::LoadMore => self.load_more(),
            FeedCommand::Reload => {
                if self.assembler.is_initialized() {
                    debug!(room = %self.config.room, "Feed already initialized, ignoring reload");
                } else {
                    self.start_initial_fetch();
                }
            }
            FeedCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            FeedCommand::Shutdown => {}
        }
    }

    fn start_initial_fetch(&mut self) {
        if self.initial_in_flight {
            debug!(room = %self.config.room, "Initial fetch already pending");
            return;
        }
        self.initial_in_flight = true;

        let store = self.store.clone();
        let query = self.cursor.initial_query();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = fetch_first_page(store.as_ref(), &query).await;
            let _ = tx.send(FetchOutcome::Initial(result)).await;
        });
    }

    fn load_more(&mut self) {
        if !self.assembler.is_initialized() {
            debug!(room = %self.config.room, "Feed not initialized, ignoring load request");
            return;
        }
        if self.assembler.state().exhausted() {
            debug!(room = %self.config.room, "Feed exhausted, nothing more to load");
            return;
        }

        let ticket = self.cursor.advance(self.assembler.state().len());
        debug!(
            room = %self.config.room,
            seq = ticket.seq(),
            skip = ticket.query().skip(),
            "Requesting page"
        );

        let store = self.store.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = store.get_messages(ticket.query()).await.map_err(FeedError::from);
            let _ = tx.send(FetchOutcome::Page { ticket, result }).await;
        });
    }

    fn handle_fetch(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Initial(result) => self.handle_first_page(result),
            FetchOutcome::Page { ticket, result } => self.handle_page(ticket, result),
        }
    }

    fn handle_first_page(&mut self, result: Result<(usize, Vec<Message>)>) {
        self.initial_in_flight = false;

        let installed = result.and_then(|(total, page)| self.assembler.initialize(total, page));
        if let Err(e) = installed {
            warn!(room = %self.config.room, error = %e, "Initial fetch failed");
            self.emit(FeedUpdate::FetchFailed {
                stage: FetchStage::Initial,
                error: e.to_string(),
            });
            return;
        }

        let user = self.identity.current_user();
        let identity = ChatIdentity::derive(self.assembler.messages(), &user);
        let state = self.assembler.state();
        info!(
            room = %self.config.room,
            total = state.total(),
            loaded = state.len(),
            chat_name = %identity.chat_name,
            reused = identity.reused,
            "Feed initialized"
        );
        self.emit(FeedUpdate::Initialized {
            total: state.total(),
            loaded: state.len(),
            exhausted: state.exhausted(),
            chat_name: identity.chat_name.clone(),
        });
        self.chat_name = Some(identity.chat_name);

        match self.router.replay(&mut self.assembler) {
            Ok(outcomes) => {
                for outcome in outcomes {
                    self.emit_outcome(outcome);
                }
            }
            Err(e) => warn!(room = %self.config.room, error = %e, "Replaying live events failed"),
        }
    }

    fn handle_page(&mut self, ticket: PageTicket, result: Result<Vec<Message>>) {
        if self.config.discard_stale_pages && !self.cursor.is_latest(&ticket) {
            debug!(room = %self.config.room, seq = ticket.seq(), "Discarding stale page");
            self.emit(FeedUpdate::PageDiscarded { seq: ticket.seq() });
            return;
        }

        let appended = result.and_then(|page| self.assembler.append_page(page));
        match appended {
            Ok(added) => {
                let exhausted = self.assembler.state().exhausted();
                debug!(room = %self.config.room, seq = ticket.seq(), added, exhausted, "Page loaded");
                self.emit(FeedUpdate::PageLoaded {
                    seq: ticket.seq(),
                    added,
                    exhausted,
                });
            }
            Err(FeedError::Exhausted { total }) => {
                debug!(room = %self.config.room, seq = ticket.seq(), total, "Feed already complete, dropping page");
            }
            Err(e) => {
                self.cursor.rollback(&ticket);
                warn!(room = %self.config.room, seq = ticket.seq(), error = %e, "Page fetch failed");
                self.emit(FeedUpdate::FetchFailed {
                    stage: FetchStage::Page,
                    error: e.to_string(),
                });
            }
        }
    }

    fn handle_live(&mut self, event: Option<LiveEvent>) {
        let Some(event) = event else {
            self.emit(FeedUpdate::LiveChannelClosed);
            return;
        };

        match self.router.route(&mut self.assembler, event) {
            Ok(outcome) => self.emit_outcome(outcome),
            Err(e) => warn!(room = %self.config.room, error = %e, "Failed to apply live event"),
        }
    }

    fn emit_outcome(&self, outcome: RouteOutcome) {
        match outcome {
            RouteOutcome::Appended(id) => self.emit(FeedUpdate::MessageAppended { id }),
            RouteOutcome::Attached { parent, comment } => {
                self.emit(FeedUpdate::CommentAttached { parent, comment })
            }
            RouteOutcome::Buffered
            | RouteOutcome::Overflowed
            | RouteOutcome::Duplicate(_)
            | RouteOutcome::Orphaned { .. } => {}
        }
    }

    fn emit(&self, update: FeedUpdate) {
        emit_update(&self.updates, update);
    }

    fn snapshot(&self) -> FeedSnapshot {
        let state = self.assembler.state();
        FeedSnapshot {
            room: self.config.room.clone(),
            mode: self.config.mode,
            messages: state.messages().to_vec(),
            total: state.total(),
            exhausted: state.exhausted(),
            initialized: self.assembler.is_initialized(),
            chat_name: self.chat_name.clone(),
            skip: self.cursor.skip(),
            live: self.router.is_connected(),
            buffered_events: self.router.buffered(),
        }
    }
}

/// Count, then fetch the first page. An empty room skips the page request.
async fn fetch_first_page(
    store: &dyn MessageStore,
    query: &MessageQuery,
) -> Result<(usize, Vec<Message>)> {
    let total = usize::try_from(store.get_message_count(query).await?.count).unwrap_or(usize::MAX);
    if total == 0 {
        return Ok((0, Vec::new()));
    }
    let page = store.get_messages(query).await?;
    Ok((total, page))
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Semaphore;

    use parley_net::{spawn_hub, HubConfig, RoomHub};
    use parley_shared::identity::{CurrentUser, StaticIdentity};
    use parley_shared::types::{Comment, MessageId, UserId};
    use parley_store::{InMemoryMessageStore, MessageCount, StoreError};

    use super::*;

    /// In-memory store with switches for failing or holding back requests.
    /// Held-back requests wait for a permit on `gate`.
    struct ScriptedStore {
        inner: InMemoryMessageStore,
        gate: Semaphore,
        gate_first_page: AtomicBool,
        gate_pages: AtomicBool,
        fail_count: AtomicBool,
        fail_pages: AtomicBool,
        page_requests: AtomicUsize,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryMessageStore::new(),
                gate: Semaphore::new(0),
                gate_first_page: AtomicBool::new(false),
                gate_pages: AtomicBool::new(false),
                fail_count: AtomicBool::new(false),
                fail_pages: AtomicBool::new(false),
                page_requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageStore for ScriptedStore {
        async fn get_message_count(&self, query: &MessageQuery) -> parley_store::Result<MessageCount> {
            if self.fail_count.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("count offline".into()));
            }
            self.inner.get_message_count(query).await
        }

        async fn get_messages(&self, query: &MessageQuery) -> parley_store::Result<Vec<Message>> {
            self.page_requests.fetch_add(1, Ordering::SeqCst);
            let paging = query.skip.is_some();
            let held = if paging {
                self.gate_pages.load(Ordering::SeqCst)
            } else {
                self.gate_first_page.load(Ordering::SeqCst)
            };
            if held {
                self.gate.acquire().await.unwrap().forget();
            }
            if paging && self.fail_pages.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("pages offline".into()));
            }
            self.inner.get_messages(query).await
        }
    }

    fn room() -> RoomId {
        RoomId::new("physics")
    }

    /// Message `m<n>` created `n` minutes into the room's life.
    fn msg(n: i64, author: &str) -> Message {
        let at = Utc.timestamp_opt(1_700_000_000 + n * 60, 0).unwrap();
        Message::new(room(), UserId::new(author), format!("{author}-name"), serde_json::Value::Null)
            .with_id(format!("m{n}"))
            .with_created_at(at)
    }

    async fn seeded(count: i64) -> Arc<ScriptedStore> {
        let store = Arc::new(ScriptedStore::new());
        for n in 1..=count {
            let author = if n == 4 { "u1" } else { "u2" };
            store.inner.insert(msg(n, author)).await;
        }
        store
    }

    async fn start(
        store: Arc<ScriptedStore>,
        mode: FeedMode,
        limit: usize,
    ) -> (FeedHandle, mpsc::Receiver<FeedUpdate>, RoomHub) {
        let hub = spawn_hub(HubConfig::default());
        let identity = StaticIdentity(CurrentUser::new("u1", "student"));
        let (handle, updates) = spawn_feed(
            FeedConfig::new(room(), mode).with_limit(limit),
            store,
            Arc::new(hub.clone()),
            Arc::new(identity),
        )
        .await
        .unwrap();
        (handle, updates, hub)
    }

    async fn next_update(updates: &mut mpsc::Receiver<FeedUpdate>) -> FeedUpdate {
        tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("timed out waiting for a feed update")
            .expect("feed update channel closed")
    }

    async fn wait_until(handle: &FeedHandle, check: impl Fn(&FeedSnapshot) -> bool) -> FeedSnapshot {
        for _ in 0..200 {
            let snapshot = handle.snapshot().await.unwrap();
            if check(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("feed never reached the expected state");
    }

    fn ids(snapshot: &FeedSnapshot) -> Vec<&str> {
        snapshot.messages.iter().map(|m| m.id.as_str()).collect()
    }

    fn comment_event(parent: &str, id: &str) -> LiveEvent {
        let mut comment = Comment::new(UserId::new("u2"), "u2-name", serde_json::json!("+1"));
        comment.id = MessageId::from(id);
        LiveEvent::Comment {
            parent: MessageId::from(parent),
            comment,
        }
    }

    #[tokio::test]
    async fn test_chat_feed_pages_up_into_display_order() {
        let (handle, mut updates, _hub) = start(seeded(5).await, FeedMode::Chat, 3).await;

        // u1 authored m4, which is on the first page
        assert_eq!(
            next_update(&mut updates).await,
            FeedUpdate::Initialized {
                total: 5,
                loaded: 3,
                exhausted: false,
                chat_name: "u1-name".into(),
            }
        );
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m3", "m4", "m5"]);
        assert_eq!(snapshot.chat_name.as_deref(), Some("u1-name"));

        handle.scroll_up().await.unwrap();
        assert_eq!(
            next_update(&mut updates).await,
            FeedUpdate::PageLoaded {
                seq: 1,
                added: 2,
                exhausted: true,
            }
        );

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m1", "m2", "m3", "m4", "m5"]);
        assert!(snapshot.exhausted);
        assert_eq!(snapshot.skip, 3);
    }

    #[tokio::test]
    async fn test_comment_feed_pages_down() {
        let store = seeded(3).await;
        let (handle, mut updates, _hub) = start(store.clone(), FeedMode::Comment, 2).await;

        match next_update(&mut updates).await {
            FeedUpdate::Initialized { total, loaded, chat_name, .. } => {
                assert_eq!((total, loaded), (3, 2));
                // m4 does not exist here, so the name is synthesized
                assert!(chat_name.starts_with("student"));
            }
            other => panic!("Unexpected update: {other:?}"),
        }

        assert!(matches!(handle.scroll_up().await, Err(FeedError::InvalidState(_))));
        handle.scroll_down().await.unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::PageLoaded { added: 1, exhausted: true, .. }
        ));

        // Exhausted feeds do not hit the store again
        let requests = store.page_requests.load(Ordering::SeqCst);
        handle.load_more().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m1", "m2", "m3"]);
        assert_eq!(store.page_requests.load(Ordering::SeqCst), requests);
    }

    #[tokio::test]
    async fn test_live_events_reach_the_feed() {
        let (handle, mut updates, hub) = start(seeded(2).await, FeedMode::Chat, 5).await;
        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::Initialized { exhausted: true, .. }
        ));

        hub.publish(&room(), &LiveEvent::NewMessage { message: msg(3, "u2") })
            .await
            .unwrap();
        assert_eq!(
            next_update(&mut updates).await,
            FeedUpdate::MessageAppended {
                id: MessageId::from("m3")
            }
        );

        hub.publish(&room(), &comment_event("m1", "c1")).await.unwrap();
        assert_eq!(
            next_update(&mut updates).await,
            FeedUpdate::CommentAttached {
                parent: MessageId::from("m1"),
                comment: MessageId::from("c1"),
            }
        );

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m1", "m2", "m3"]);
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.messages[0].comments.len(), 1);
    }

    /// Wait until the first page request is out, which means the room has
    /// already been counted.
    async fn wait_for_count(store: &ScriptedStore) {
        for _ in 0..200 {
            if store.page_requests.load(Ordering::SeqCst) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("first page was never requested");
    }

    /// Store and broadcast a message, the way a poster would.
    async fn post(store: &ScriptedStore, hub: &RoomHub, message: Message) {
        store.inner.insert(message.clone()).await;
        hub.publish(&room(), &LiveEvent::NewMessage { message }).await.unwrap();
    }

    #[tokio::test]
    async fn test_events_during_first_fetch_are_replayed_once() {
        let store = seeded(5).await;
        store.gate_first_page.store(true, Ordering::SeqCst);
        let (handle, mut updates, hub) = start(store.clone(), FeedMode::Chat, 3).await;
        wait_for_count(&store).await;

        // m6 lands on the first page; m7 is only broadcast
        post(&store, &hub, msg(6, "u2")).await;
        hub.publish(&room(), &LiveEvent::NewMessage { message: msg(7, "u2") })
            .await
            .unwrap();
        hub.publish(&room(), &comment_event("m5", "c1")).await.unwrap();
        wait_until(&handle, |s| s.buffered_events == 3).await;

        store.gate.add_permits(1);
        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::Initialized { total: 5, loaded: 3, .. }
        ));
        assert_eq!(
            next_update(&mut updates).await,
            FeedUpdate::MessageAppended {
                id: MessageId::from("m7")
            }
        );
        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::CommentAttached { .. }
        ));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m4", "m5", "m6", "m7"]);
        assert_eq!(snapshot.total, 7);
        assert_eq!(snapshot.buffered_events, 0);
        assert_eq!(snapshot.messages[1].comments.len(), 1);
    }

    #[tokio::test]
    async fn test_message_posted_during_first_fetch_keeps_paging() {
        crate::init_tracing();
        let store = seeded(5).await;
        store.gate_first_page.store(true, Ordering::SeqCst);
        let (handle, mut updates, hub) = start(store.clone(), FeedMode::Chat, 3).await;
        wait_for_count(&store).await;

        post(&store, &hub, msg(6, "u2")).await;
        wait_until(&handle, |s| s.buffered_events == 1).await;
        store.gate.add_permits(1);

        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::Initialized { total: 5, loaded: 3, .. }
        ));
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m4", "m5", "m6"]);
        assert_eq!(snapshot.total, 6);

        handle.scroll_up().await.unwrap();
        assert_eq!(
            next_update(&mut updates).await,
            FeedUpdate::PageLoaded {
                seq: 1,
                added: 3,
                exhausted: true,
            }
        );
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m1", "m2", "m3", "m4", "m5", "m6"]);
    }

    #[tokio::test]
    async fn test_small_room_growing_during_first_fetch_initializes() {
        let store = seeded(2).await;
        store.gate_first_page.store(true, Ordering::SeqCst);
        let (handle, mut updates, hub) = start(store.clone(), FeedMode::Chat, 5).await;
        wait_for_count(&store).await;

        post(&store, &hub, msg(3, "u2")).await;
        wait_until(&handle, |s| s.buffered_events == 1).await;
        store.gate.add_permits(1);

        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::Initialized { total: 3, loaded: 3, exhausted: true, .. }
        ));
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m1", "m2", "m3"]);
        assert_eq!(snapshot.total, 3);
        assert!(snapshot.exhausted);
    }

    #[tokio::test]
    async fn test_failed_initial_fetch_can_be_reloaded() {
        let store = seeded(2).await;
        store.fail_count.store(true, Ordering::SeqCst);
        let (handle, mut updates, _hub) = start(store.clone(), FeedMode::Chat, 5).await;

        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::FetchFailed { stage: FetchStage::Initial, .. }
        ));
        let snapshot = handle.snapshot().await.unwrap();
        assert!(!snapshot.initialized);
        assert!(snapshot.live);

        // Paging is ignored until the feed is initialized
        handle.load_more().await.unwrap();

        store.fail_count.store(false, Ordering::SeqCst);
        handle.reload().await.unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::Initialized { total: 2, loaded: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_page_rolls_cursor_back() {
        let store = seeded(5).await;
        store.fail_pages.store(true, Ordering::SeqCst);
        let (handle, mut updates, _hub) = start(store.clone(), FeedMode::Chat, 3).await;
        next_update(&mut updates).await;

        handle.scroll_up().await.unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::FetchFailed { stage: FetchStage::Page, .. }
        ));
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.skip, 0);
        assert_eq!(snapshot.messages.len(), 3);

        store.fail_pages.store(false, Ordering::SeqCst);
        handle.scroll_up().await.unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::PageLoaded { seq: 2, added: 2, exhausted: true }
        ));
    }

    #[tokio::test]
    async fn test_stale_page_is_discarded() {
        let store = seeded(5).await;
        store.gate_pages.store(true, Ordering::SeqCst);
        let (handle, mut updates, _hub) = start(store.clone(), FeedMode::Chat, 3).await;
        next_update(&mut updates).await;

        handle.scroll_up().await.unwrap();
        handle.scroll_up().await.unwrap();
        // Commands are handled in order, so both requests are out by now
        handle.snapshot().await.unwrap();
        store.gate.add_permits(2);

        let mut seen = vec![next_update(&mut updates).await, next_update(&mut updates).await];
        seen.sort_by_key(|u| u.name());
        assert_eq!(
            seen,
            vec![
                FeedUpdate::PageDiscarded { seq: 1 },
                FeedUpdate::PageLoaded {
                    seq: 2,
                    added: 2,
                    exhausted: true,
                },
            ]
        );

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot), ["m1", "m2", "m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn test_empty_room_skips_page_fetch() {
        let store = seeded(0).await;
        let (handle, mut updates, _hub) = start(store.clone(), FeedMode::Comment, 3).await;

        assert!(matches!(
            next_update(&mut updates).await,
            FeedUpdate::Initialized { total: 0, loaded: 0, exhausted: true, .. }
        ));
        handle.load_more().await.unwrap();
        handle.snapshot().await.unwrap();
        assert_eq!(store.page_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscription() {
        let (handle, mut updates, hub) = start(seeded(1).await, FeedMode::Chat, 3).await;
        next_update(&mut updates).await;
        assert_eq!(hub.subscriber_count(&room()).await.unwrap(), 1);

        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count(&room()).await.unwrap() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription was not released");

        assert!(matches!(handle.snapshot().await, Err(FeedError::Stopped)));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_feed() {
        let (handle, mut updates, hub) = start(seeded(1).await, FeedMode::Chat, 3).await;
        next_update(&mut updates).await;

        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count(&room()).await.unwrap() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription was not released");
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_channel_keeps_history() {
        let (handle, mut updates, hub) = start(seeded(2).await, FeedMode::Chat, 5).await;
        next_update(&mut updates).await;

        hub.shutdown().await.unwrap();
        assert_eq!(next_update(&mut updates).await, FeedUpdate::LiveChannelClosed);

        let snapshot = handle.snapshot().await.unwrap();
        assert!(!snapshot.live);
        assert_eq!(snapshot.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let hub = spawn_hub(HubConfig::default());
        let result = spawn_feed(
            FeedConfig::default(),
            Arc::new(ScriptedStore::new()),
            Arc::new(hub),
            Arc::new(StaticIdentity(CurrentUser::new("u1", "student"))),
        )
        .await;
        assert!(matches!(result, Err(FeedError::Config(_))));
    }
}
