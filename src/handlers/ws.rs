//! WebSocket handler: identity binding, location updates, topic watching, disconnect cleanup.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BroadcastScope;
use crate::error::{AppError, AppResult};
use crate::handlers::http::AppState;
use crate::middleware::auth::TokenUser;
use crate::models::event::{ClientMessage, WsEvent};
use crate::models::presence::generate_socket_id;
use crate::models::topic::Topic;
use crate::services::{BroadcastService, PresenceService};

/// Most agents a single connection may watch at once.
const MAX_WATCHED: usize = 32;

/// Upgrade HTTP to WebSocket. A token, when present, pins the connection to its user.
pub async fn ws_handler(
    State(state): State<AppState>,
    TokenUser(token_user): TokenUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket, token_user))
}

/// Per-connection state: the outbound queue and one forwarding task per joined topic.
struct Session {
    socket_id: String,
    token_user: Option<String>,
    outbound: mpsc::UnboundedSender<String>,
    forwards: HashMap<Topic, JoinHandle<()>>,
}

impl Session {
    fn new(
        socket_id: String,
        token_user: Option<String>,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            socket_id,
            token_user,
            outbound,
            forwards: HashMap::new(),
        }
    }

    fn send(&self, event: &WsEvent) {
        match event.to_text() {
            Ok(text) => {
                let _ = self.outbound.send(text);
            }
            Err(e) => warn!(socket_id = %self.socket_id, error = %e, "encode failed"),
        }
    }

    fn reject(&self, err: &AppError) {
        debug!(socket_id = %self.socket_id, error = %err, "message rejected");
        self.send(&WsEvent::error(err));
    }

    /// An authenticated connection may only speak for its own user.
    fn check_identity(&self, user_id: &str) -> AppResult<()> {
        match &self.token_user {
            Some(owner) if owner != user_id => Err(AppError::Forbidden(
                "connection is authenticated as another user".to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn join(&mut self, bus: &BroadcastService, topic: Topic) -> AppResult<()> {
        if self.forwards.contains_key(&topic) {
            return Ok(());
        }
        let mut rx = bus.subscribe(&topic).await?;
        let tx = self.outbound.clone();
        let socket_id = self.socket_id.clone();
        let name = topic.name();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(socket_id = %socket_id, topic = %name, skipped = n, "subscriber lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        debug!(socket_id = %self.socket_id, topic = %topic, "joined");
        self.forwards.insert(topic, handle);
        Ok(())
    }

    async fn leave(&mut self, bus: &BroadcastService, topic: &Topic) {
        if let Some(handle) = self.forwards.remove(topic) {
            handle.abort();
            let _ = handle.await;
            bus.prune(topic).await;
            debug!(socket_id = %self.socket_id, topic = %topic, "left");
        }
    }

    /// Join `user_id`'s notification room. Rooms of users bound earlier are kept.
    async fn enter_room(&mut self, bus: &BroadcastService, user_id: &str) {
        if let Err(e) = self.join(bus, Topic::User(user_id.to_string())).await {
            warn!(socket_id = %self.socket_id, user_id = %user_id, error = %e, "join user room failed")
        }
    }

    fn watched(&self) -> usize {
        self.forwards
            .keys()
            .filter(|topic| matches!(topic, Topic::Delivery(_)))
            .count()
    }

    async fn close(&mut self, bus: &BroadcastService) {
        let forwards = std::mem::take(&mut self.forwards);
        for (topic, handle) in forwards {
            handle.abort();
            let _ = handle.await;
            bus.prune(&topic).await;
        }
    }
}

async fn handle_socket(state: AppState, socket: WebSocket, token_user: Option<String>) {
    let socket_id = generate_socket_id();
    info!(socket_id = %socket_id, authenticated = token_user.is_some(), "ws connected");

    let (mut sender, mut receiver) = socket.split();

    let hello = match WsEvent::connection_established(&socket_id).to_text() {
        Ok(text) => text,
        Err(e) => {
            warn!(socket_id = %socket_id, error = %e, "encode failed");
            return;
        }
    };
    if sender.send(Message::Text(hello)).await.is_err() {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let hub = state.presence_service().clone();
    let mut session = Session::new(socket_id.clone(), token_user, tx);
    open_session(&hub, &mut session).await;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => handle_text(&hub, &mut session, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    close_session(&hub, &mut session).await;
    send_task.abort();
    info!(socket_id = %socket_id, "ws disconnected");
}

async fn open_session(hub: &PresenceService, session: &mut Session) {
    if hub.scope() == BroadcastScope::Global {
        if let Err(e) = session.join(hub.broadcast(), Topic::Deliveries).await {
            warn!(socket_id = %session.socket_id, error = %e, "join deliveries failed");
        }
    }
}

/// Runs after the read loop, so no handler of this connection is still in flight.
async fn close_session(hub: &PresenceService, session: &mut Session) {
    match hub.disconnect(&session.socket_id).await {
        Ok(cleared) => debug!(socket_id = %session.socket_id, cleared, "presence cleanup"),
        Err(e) => warn!(socket_id = %session.socket_id, error = %e, "presence cleanup failed"),
    }
    session.close(hub.broadcast()).await;
}

/// One inbound frame. Every failure stops here: client faults get an `error` frame,
/// store and bus faults are only logged.
async fn handle_text(hub: &PresenceService, session: &mut Session, text: &str) {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            session.reject(&AppError::from(e));
            return;
        }
    };

    match msg {
        ClientMessage::Identity(payload) => {
            let user_id = match payload.into_user_id() {
                Ok(user_id) => user_id,
                Err(e) => return session.reject(&e),
            };
            if let Err(e) = session.check_identity(&user_id) {
                return session.reject(&e);
            }
            match hub.bind_identity(&session.socket_id, &user_id).await {
                Ok(_) => session.enter_room(hub.broadcast(), &user_id).await,
                Err(e) if e.is_backend() => {
                    warn!(socket_id = %session.socket_id, user_id = %user_id, error = %e, "identity bind dropped")
                }
                Err(e) => {
                    debug!(socket_id = %session.socket_id, user_id = %user_id, error = %e, "identity not bound")
                }
            }
        }
        ClientMessage::UpdateLocation(payload) => {
            let update = match payload.into_update() {
                Ok(update) => update,
                Err(e) => return session.reject(&e),
            };
            if let Err(e) = session.check_identity(&update.user_id) {
                return session.reject(&e);
            }
            match hub.update_location(&session.socket_id, &update).await {
                Ok(Some(_)) => session.enter_room(hub.broadcast(), &update.user_id).await,
                Ok(None) => {
                    debug!(socket_id = %session.socket_id, user_id = %update.user_id, "no user for location update")
                }
                Err(e) if e.is_backend() => {
                    warn!(socket_id = %session.socket_id, user_id = %update.user_id, error = %e, "location update dropped")
                }
                Err(e) => {
                    debug!(socket_id = %session.socket_id, user_id = %update.user_id, error = %e, "location update not applied")
                }
            }
        }
        ClientMessage::WatchDelivery(payload) => {
            let delivery_id = match payload.into_delivery_id() {
                Ok(id) => id,
                Err(e) => return session.reject(&e),
            };
            if hub.scope() == BroadcastScope::Global {
                debug!(socket_id = %session.socket_id, "watch ignored: receiving all deliveries");
                return;
            }
            let topic = Topic::Delivery(delivery_id);
            if !session.forwards.contains_key(&topic) && session.watched() >= MAX_WATCHED {
                return session.reject(&AppError::Validation(format!(
                    "cannot watch more than {} deliveries",
                    MAX_WATCHED
                )));
            }
            if let Err(e) = session
                .join(hub.broadcast(), topic)
                .await
            {
                warn!(socket_id = %session.socket_id, error = %e, "watch failed");
            }
        }
        ClientMessage::UnwatchDelivery(payload) => {
            let delivery_id = match payload.into_delivery_id() {
                Ok(id) => id,
                Err(e) => return session.reject(&e),
            };
            session
                .leave(hub.broadcast(), &Topic::Delivery(delivery_id))
                .await;
        }
        ClientMessage::Ping => session.send(&WsEvent::pong()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryUserDirectory;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    struct Client {
        session: Session,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl Client {
        async fn connect(hub: &PresenceService, token_user: Option<&str>) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut session =
                Session::new(generate_socket_id(), token_user.map(String::from), tx);
            open_session(hub, &mut session).await;
            Self { session, rx }
        }

        async fn say(&mut self, hub: &PresenceService, text: &str) {
            handle_text(hub, &mut self.session, text).await;
        }

        async fn next(&mut self) -> Value {
            let raw = tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
                .await
                .expect("timed out waiting for frame")
                .expect("outbound closed");
            serde_json::from_str(&raw).unwrap()
        }

        async fn silent(&mut self) -> bool {
            tokio::time::timeout(Duration::from_millis(50), self.rx.recv())
                .await
                .is_err()
        }

        async fn disconnect(mut self, hub: &PresenceService) {
            close_session(hub, &mut self.session).await;
        }
    }

    fn hub(dir: &MemoryUserDirectory, scope: BroadcastScope) -> PresenceService {
        PresenceService::new(Arc::new(dir.clone()), BroadcastService::local(), scope)
    }

    const UPDATE_D1: &str =
        r#"{"event":"updateLocation","data":{"userId":"d1","latitude":12.5,"longitude":77.25}}"#;

    #[tokio::test]
    async fn malformed_frame_gets_error_and_connection_survives() {
        let dir = MemoryUserDirectory::with_users(["u1"]);
        let hub = hub(&dir, BroadcastScope::Global);
        let mut c = Client::connect(&hub, None).await;

        c.say(&hub, "not json").await;
        let err = c.next().await;
        assert_eq!(err["event"], "error");
        assert_eq!(err["data"]["code"], 4000);

        c.say(&hub, r#"{"event":"ping"}"#).await;
        assert_eq!(c.next().await["event"], "pong");
    }

    #[tokio::test]
    async fn empty_user_id_is_rejected_before_the_store() {
        let dir = MemoryUserDirectory::with_users(["u1"]);
        let hub = hub(&dir, BroadcastScope::Global);
        let mut c = Client::connect(&hub, None).await;

        c.say(&hub, r#"{"event":"identity","data":{"userId":""}}"#).await;
        assert_eq!(c.next().await["data"]["code"], 4001);
        assert_eq!(hub.registry().len().await, 0);
    }

    #[tokio::test]
    async fn sender_receives_its_own_broadcast() {
        let dir = MemoryUserDirectory::with_users(["d1"]);
        let hub = hub(&dir, BroadcastScope::Global);
        let mut c = Client::connect(&hub, None).await;

        c.say(&hub, UPDATE_D1).await;
        let frame = c.next().await;
        assert_eq!(frame["event"], "updateDeliveryLocation");
        assert_eq!(frame["data"]["deliveryBoyId"], "d1");
        assert_eq!(frame["data"]["latitude"], 12.5);
        assert_eq!(frame["data"]["longitude"], 77.25);
    }

    #[tokio::test]
    async fn watchers_scope_only_reaches_watchers() {
        let dir = MemoryUserDirectory::with_users(["d1"]);
        let hub = hub(&dir, BroadcastScope::Watchers);
        let mut agent = Client::connect(&hub, None).await;
        let mut watcher = Client::connect(&hub, None).await;
        let mut bystander = Client::connect(&hub, None).await;

        watcher
            .say(&hub, r#"{"event":"watchDelivery","data":{"deliveryBoyId":"d1"}}"#)
            .await;
        agent.say(&hub, UPDATE_D1).await;

        assert_eq!(watcher.next().await["data"]["deliveryBoyId"], "d1");
        assert!(bystander.silent().await);
        assert!(agent.silent().await);

        watcher
            .say(&hub, r#"{"event":"unwatchDelivery","data":{"deliveryBoyId":"d1"}}"#)
            .await;
        agent.say(&hub, UPDATE_D1).await;
        assert!(watcher.silent().await);
        assert_eq!(
            hub.broadcast()
                .subscriber_count(&Topic::Delivery("d1".into()))
                .await,
            0
        );
    }

    #[tokio::test]
    async fn token_pins_identity() {
        let dir = MemoryUserDirectory::with_users(["u1", "u2"]);
        let hub = hub(&dir, BroadcastScope::Global);
        let mut c = Client::connect(&hub, Some("u1")).await;

        c.say(&hub, r#"{"event":"identity","data":{"userId":"u2"}}"#).await;
        assert_eq!(c.next().await["data"]["code"], 4003);
        assert!(!hub.presence("u2").await.unwrap().is_online);

        c.say(&hub, r#"{"event":"identity","data":{"userId":"u1"}}"#).await;
        assert!(hub.presence("u1").await.unwrap().is_online);
    }

    #[tokio::test]
    async fn bound_connection_receives_user_notifications() {
        let dir = MemoryUserDirectory::with_users(["u1"]);
        let hub = hub(&dir, BroadcastScope::Watchers);
        let mut c = Client::connect(&hub, None).await;

        c.say(&hub, r#"{"event":"identity","data":{"userId":"u1"}}"#).await;
        let reached = hub
            .notify("u1", &WsEvent::new("newOrder", serde_json::json!({"orderId": "o1"})))
            .await
            .unwrap();
        assert_eq!(reached, 1);
        let frame = c.next().await;
        assert_eq!(frame["event"], "newOrder");
        assert_eq!(frame["data"]["orderId"], "o1");
    }

    #[tokio::test]
    async fn disconnect_releases_topics() {
        let dir = MemoryUserDirectory::with_users(["u1"]);
        let hub = hub(&dir, BroadcastScope::Global);
        let mut c = Client::connect(&hub, None).await;
        c.say(&hub, r#"{"event":"identity","data":{"userId":"u1"}}"#).await;
        assert_eq!(hub.broadcast().subscriber_count(&Topic::Deliveries).await, 1);

        c.disconnect(&hub).await;
        assert_eq!(hub.broadcast().subscriber_count(&Topic::Deliveries).await, 0);
        assert_eq!(
            hub.broadcast()
                .subscriber_count(&Topic::User("u1".into()))
                .await,
            0
        );
        let record = hub.presence("u1").await.unwrap();
        assert!(!record.is_online);
        assert_eq!(record.connection_handle, None);
    }

    #[tokio::test]
    async fn watch_count_is_capped_per_connection() {
        let dir = MemoryUserDirectory::new();
        let hub = hub(&dir, BroadcastScope::Watchers);
        let mut c = Client::connect(&hub, None).await;

        let watch = |id: usize| {
            format!(r#"{{"event":"watchDelivery","data":{{"deliveryBoyId":"d{}"}}}}"#, id)
        };
        for id in 0..MAX_WATCHED {
            c.say(&hub, &watch(id)).await;
        }
        assert!(c.silent().await);

        c.say(&hub, &watch(MAX_WATCHED)).await;
        assert_eq!(c.next().await["data"]["code"], 4001);
        assert_eq!(
            hub.broadcast()
                .subscriber_count(&Topic::Delivery(format!("d{}", MAX_WATCHED)))
                .await,
            0
        );

        // re-watching an agent already watched is not a new subscription
        c.say(&hub, &watch(0)).await;
        assert!(c.silent().await);
    }

    #[tokio::test]
    async fn second_identity_keeps_both_rooms_and_users() {
        let dir = MemoryUserDirectory::with_users(["u1", "u2"]);
        let hub = hub(&dir, BroadcastScope::Global);
        let mut c = Client::connect(&hub, None).await;

        c.say(&hub, r#"{"event":"identity","data":{"userId":"u1"}}"#).await;
        c.say(&hub, r#"{"event":"identity","data":{"userId":"u2"}}"#).await;
        assert!(hub.presence("u1").await.unwrap().is_online);
        assert!(hub.presence("u2").await.unwrap().is_online);

        hub.notify("u1", &WsEvent::new("newOrder", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(c.next().await["event"], "newOrder");

        c.disconnect(&hub).await;
        assert!(!hub.presence("u1").await.unwrap().is_online);
        assert!(!hub.presence("u2").await.unwrap().is_online);
    }

    /// Relay whose subscriptions work but whose publishes fail.
    struct PublishDown;

    #[async_trait::async_trait]
    impl crate::repositories::TopicRelay for PublishDown {
        async fn publish(&self, _topic: &str, _message: &str) -> AppResult<usize> {
            Err(anyhow::anyhow!("publish unreachable").into())
        }

        async fn forward(
            &self,
            _topic: &str,
            _sink: tokio::sync::broadcast::Sender<String>,
        ) -> AppResult<JoinHandle<()>> {
            Ok(tokio::spawn(std::future::pending()))
        }
    }

    #[tokio::test]
    async fn stored_update_joins_user_room_even_if_broadcast_fails() {
        let dir = MemoryUserDirectory::with_users(["d1"]);
        let hub = PresenceService::new(
            Arc::new(dir.clone()),
            BroadcastService::with_relay(Arc::new(PublishDown)),
            BroadcastScope::Watchers,
        );
        let mut c = Client::connect(&hub, None).await;

        c.say(&hub, UPDATE_D1).await;
        assert!(c.silent().await);
        assert_eq!(
            hub.broadcast()
                .subscriber_count(&Topic::User("d1".into()))
                .await,
            1
        );
        assert!(hub.presence("d1").await.unwrap().is_online);
    }
}
