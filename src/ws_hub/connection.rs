// =============================================================================
// Per-connection state
// =============================================================================

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Inbound client protocol. Anything else is ignored rather than closing the
/// connection, so a client on a slightly newer/older protocol version still
/// keeps its existing subscriptions working.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { symbols: Vec<String> },
    Unsubscribe { symbols: Vec<String> },
    SubscribeToplist { names: Vec<String> },
    UnsubscribeToplist { names: Vec<String> },
    Ping,
}

/// Outbound server protocol.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Alert(&'a crate::models::Alert),
    Toplist {
        name: &'a str,
        rankings: &'a [crate::models::ToplistRanking],
    },
    Pong,
}

pub struct ConnectionState {
    pub id: String,
    pub user_id: Option<String>,
    pub send_queue: mpsc::Sender<String>,
    pub symbol_subs: HashSet<String>,
    pub toplist_subs: HashSet<String>,
    pub last_pong_time: Instant,
}

impl ConnectionState {
    pub fn new(id: String, user_id: Option<String>, send_queue: mpsc::Sender<String>) -> Self {
        Self {
            id,
            user_id,
            send_queue,
            symbol_subs: HashSet::new(),
            toplist_subs: HashSet::new(),
            last_pong_time: Instant::now(),
        }
    }

    pub fn apply(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Subscribe { symbols } => {
                self.symbol_subs.extend(symbols);
            }
            ClientMessage::Unsubscribe { symbols } => {
                for s in symbols {
                    self.symbol_subs.remove(&s);
                }
            }
            ClientMessage::SubscribeToplist { names } => {
                self.toplist_subs.extend(names);
            }
            ClientMessage::UnsubscribeToplist { names } => {
                for n in names {
                    self.toplist_subs.remove(&n);
                }
            }
            ClientMessage::Ping => {
                self.last_pong_time = Instant::now();
            }
        }
    }

    /// Per spec: a connection with no symbol subscriptions receives every
    /// alert; a connection with a non-empty set only receives symbols in it.
    pub fn should_receive_alert(&self, alert: &crate::models::Alert) -> bool {
        self.symbol_subs.is_empty() || self.symbol_subs.contains(&alert.symbol)
    }

    pub fn should_receive_toplist(&self, name: &str) -> bool {
        self.toplist_subs.contains(name)
    }

    pub fn is_idle(&self, idle_timeout: std::time::Duration) -> bool {
        self.last_pong_time.elapsed() > idle_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn() -> ConnectionState {
        let (tx, _rx) = mpsc::channel(8);
        ConnectionState::new("c1".into(), None, tx)
    }

    #[test]
    fn subscribe_then_unsubscribe_clears_symbol() {
        let mut c = conn();
        c.apply(ClientMessage::Subscribe { symbols: vec!["BTCUSDT".into()] });
        assert!(c.symbol_subs.contains("BTCUSDT"));
        c.apply(ClientMessage::Unsubscribe { symbols: vec!["BTCUSDT".into()] });
        assert!(!c.symbol_subs.contains("BTCUSDT"));
    }

    fn alert(symbol: &str) -> crate::models::Alert {
        crate::models::Alert {
            id: "a1".into(),
            rule_id: "r1".into(),
            rule_name: "test rule".into(),
            symbol: symbol.into(),
            timestamp: chrono::Utc::now(),
            price: 100.0,
            message: "test".into(),
            metadata: json!({}),
            trace_id: "t1".into(),
        }
    }

    #[test]
    fn should_receive_alert_only_for_subscribed_symbol() {
        let mut c = conn();
        c.apply(ClientMessage::Subscribe { symbols: vec!["BTCUSDT".into()] });
        assert!(!c.should_receive_alert(&alert("ETHUSDT")));
        assert!(c.should_receive_alert(&alert("BTCUSDT")));
    }

    #[test]
    fn should_receive_alert_with_no_subscriptions_receives_everything() {
        let c = conn();
        assert!(c.should_receive_alert(&alert("BTCUSDT")));
        assert!(c.should_receive_alert(&alert("ETHUSDT")));
    }

    #[test]
    fn ping_refreshes_last_pong_time() {
        let mut c = conn();
        c.last_pong_time = Instant::now() - std::time::Duration::from_secs(90);
        c.apply(ClientMessage::Ping);
        assert!(!c.is_idle(std::time::Duration::from_secs(60)));
    }

    #[test]
    fn idle_after_timeout_elapses() {
        let mut c = conn();
        c.last_pong_time = Instant::now() - std::time::Duration::from_secs(200);
        assert!(c.is_idle(std::time::Duration::from_secs(120)));
    }

    #[test]
    fn toplist_subscribe_and_unsubscribe() {
        let mut c = conn();
        c.apply(ClientMessage::SubscribeToplist { names: vec!["top_gainers".into()] });
        assert!(c.should_receive_toplist("top_gainers"));
        c.apply(ClientMessage::UnsubscribeToplist { names: vec!["top_gainers".into()] });
        assert!(!c.should_receive_toplist("top_gainers"));
    }
}
