use super::{ClientId, GatewayState};
use crate::ws::events::ServerEvent;

impl GatewayState {
    /// Send to every connection joined to the chat room, optionally skipping
    /// one client (the originating connection for typing indicators).
    pub async fn broadcast_chat(
        &self,
        chat_id: &str,
        event: &ServerEvent,
        exclude: Option<ClientId>,
    ) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let subs = self.chat_subs.read().await;
        let clients = self.clients.read().await;

        if let Some(subscriber_ids) = subs.get(chat_id) {
            for &cid in subscriber_ids {
                if Some(cid) == exclude {
                    continue;
                }
                if let Some(client) = clients.get(&cid) {
                    let _ = client.tx.send(msg.clone());
                }
            }
        }
    }

    /// Room broadcast skipping every connection of one user, not just a
    /// single client. Used for reconciler notifications where the actor
    /// should not be told about their own upload.
    pub async fn broadcast_chat_excluding_user(
        &self,
        chat_id: &str,
        event: &ServerEvent,
        exclude_user_id: &str,
    ) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let subs = self.chat_subs.read().await;
        let clients = self.clients.read().await;

        if let Some(subscriber_ids) = subs.get(chat_id) {
            for &cid in subscriber_ids {
                if let Some(client) = clients.get(&cid) {
                    if client.user_id == exclude_user_id {
                        continue;
                    }
                    let _ = client.tx.send(msg.clone());
                }
            }
        }
    }

    pub async fn broadcast_all(&self, event: &ServerEvent, exclude: Option<ClientId>) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let clients = self.clients.read().await;
        for (&cid, client) in clients.iter() {
            if Some(cid) == exclude {
                continue;
            }
            let _ = client.tx.send(msg.clone());
        }
    }

    pub async fn send_to(&self, client_id: ClientId, event: &ServerEvent) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let clients = self.clients.read().await;
        if let Some(client) = clients.get(&client_id) {
            let _ = client.tx.send(msg);
        }
    }

    /// Deliver to all live connections of one user.
    pub async fn send_to_user(&self, user_id: &str, event: &ServerEvent) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let clients = self.clients.read().await;
        for client in clients.values() {
            if client.user_id == user_id {
                let _ = client.tx.send(msg.clone());
            }
        }
    }
}
