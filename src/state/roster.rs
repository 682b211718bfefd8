use super::GameState;
use crate::types::*;

impl GameState {
    /// Add a participant with no score. Returns false if the username is taken.
    pub async fn add_participant(
        &self,
        username: &str,
        is_admin: bool,
        is_spectator: bool,
        ip: &str,
    ) -> bool {
        let mut game = self.lock().await;
        if game.participants.contains_key(username) {
            return false;
        }
        game.participants.insert(
            username.to_string(),
            Participant::new(username, is_admin, is_spectator, ip),
        );
        tracing::info!(username, is_admin, is_spectator, ip, "Participant added");
        true
    }

    /// Remove a participant. Their answers stay in the log.
    pub async fn remove_participant(&self, username: &str) -> Option<Participant> {
        let removed = self.lock().await.participants.remove(username);
        if removed.is_some() {
            tracing::info!(username, "Participant removed");
        }
        removed
    }

    pub async fn set_admin(&self, username: &str) {
        if let Some(p) = self.lock().await.participants.get_mut(username) {
            p.is_admin = true;
        }
    }

    pub async fn set_spectator(&self, username: &str) {
        if let Some(p) = self.lock().await.participants.get_mut(username) {
            p.is_spectator = true;
        }
    }

    pub async fn participant(&self, username: &str) -> Option<Participant> {
        self.lock().await.participants.get(username).cloned()
    }

    pub async fn has_participant(&self, username: &str) -> bool {
        self.lock().await.participants.contains_key(username)
    }

    pub async fn participant_count(&self) -> usize {
        self.lock().await.participants.len()
    }

    pub async fn is_admin(&self, username: &str) -> bool {
        self.lock()
            .await
            .participants
            .get(username)
            .is_some_and(|p| p.is_admin)
    }

    /// Show a message to a participant for the next `ticks` state reads
    pub async fn message_participant(&self, username: &str, text: &str, ticks: u32) -> bool {
        let mut game = self.lock().await;
        let Some(p) = game.participants.get_mut(username) else {
            return false;
        };
        if ticks == 0 || text.is_empty() {
            p.message = None;
            p.message_ticks = 0;
        } else {
            p.message = Some(text.to_string());
            p.message_ticks = ticks;
        }
        true
    }
}
