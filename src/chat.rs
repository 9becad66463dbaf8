//! Per-project chat transcripts and the send/reset protocol.
//!
//! Sends for one project are single-flight: a send issued while another is in
//! flight for the same project waits on that project's lane, so replies are
//! applied in issue order. A reply is applied only if nothing superseded its
//! ticket meanwhile (a reset, the project being removed) and the identity it
//! was sent for is still the current one.
//!
//! Transcripts are kept per project for the life of the session, so
//! reselecting a project shows its conversation again.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::gateway::ChatReply;
use crate::models::{Message, ProjectId, Role};
use crate::session::Session;
use crate::store::ProjectStore;
use crate::sync::{lock, Lanes, Sequencer};

#[derive(Debug, Default)]
struct ChatState {
    transcripts: HashMap<ProjectId, Vec<Message>>,
    seq: Sequencer<ProjectId>,
}

pub struct ChatSession {
    store: Arc<ProjectStore>,
    state: Mutex<ChatState>,
    lanes: Lanes<ProjectId>,
}

impl ChatSession {
    pub fn new(store: Arc<ProjectStore>) -> Self {
        Self { store, state: Mutex::new(ChatState::default()), lanes: Lanes::new() }
    }

    pub fn transcript(&self, id: ProjectId) -> Vec<Message> {
        lock(&self.state).transcripts.get(&id).cloned().unwrap_or_default()
    }

    /// Transcript of the selected project; empty when nothing is selected.
    pub fn active_transcript(&self) -> Vec<Message> {
        self.store.selected_id().map(|id| self.transcript(id)).unwrap_or_default()
    }

    /// Send `content` to the project's conversation and return the transcript.
    pub async fn send(&self, session: &Session, id: ProjectId, content: &str) -> Result<Vec<Message>, ClientError> {
        if content.trim().is_empty() {
            return Err(ClientError::Validation { field: "message" });
        }
        if !self.store.contains(id) {
            return Err(ClientError::UnknownProject(id));
        }

        let _lane = self.lanes.enter(&id).await;
        let ticket = lock(&self.state).seq.issue(&id, session.epoch());
        debug!(project_id = %id, seq = ticket.seq(), len = content.len(), "sending chat message");
        let reply = self.store.gateway().send_chat(session, id, content).await?;

        let mut st = lock(&self.state);
        if !st.seq.settle(&ticket) {
            warn!(project_id = %id, seq = ticket.seq(), "discarding superseded chat reply");
            return Ok(st.transcripts.get(&id).cloned().unwrap_or_default());
        }
        let transcript = st.transcripts.entry(id).or_default();
        match reply {
            ChatReply::History(history) => {
                if !ends_with_exchange(&history, content) {
                    warn!(project_id = %id, "server history does not end with the message just sent");
                }
                *transcript = history;
            }
            ChatReply::Reply(answer) => {
                transcript.push(Message::user(content));
                transcript.push(Message::assistant(answer));
            }
        }
        Ok(transcript.clone())
    }

    /// Clear the project's history remotely, then locally. The local
    /// transcript is cleared even when the remote call fails; that failure is
    /// still returned.
    pub async fn reset(&self, session: &Session, id: ProjectId) -> Result<(), ClientError> {
        let _lane = self.lanes.enter(&id).await;
        let outcome = self.store.gateway().reset_chat(session, id).await;
        {
            let mut st = lock(&self.state);
            // After an identity change the transcript is already gone.
            if st.seq.epoch() == session.epoch() {
                st.transcripts.remove(&id);
                st.seq.supersede(&id);
            }
        }
        match &outcome {
            Ok(_) => info!(project_id = %id, "chat history reset"),
            Err(e) => warn!(project_id = %id, error = %e, "remote reset failed; local transcript cleared anyway"),
        }
        outcome.map(|_| ())
    }

    /// Drop a project's transcript and retire any reply still in flight for it.
    pub(crate) fn discard(&self, id: ProjectId) {
        let mut st = lock(&self.state);
        st.transcripts.remove(&id);
        st.seq.supersede(&id);
    }

    /// Keep only transcripts of the listed projects.
    pub(crate) fn retain(&self, live: &HashSet<ProjectId>) {
        let mut st = lock(&self.state);
        let gone: Vec<ProjectId> = st.transcripts.keys().filter(|id| !live.contains(id)).copied().collect();
        for id in gone {
            debug!(project_id = %id, "dropping transcript of unlisted project");
            st.transcripts.remove(&id);
            st.seq.supersede(&id);
        }
    }

    /// Drop every transcript and adopt the identity `epoch`.
    pub(crate) fn clear(&self, epoch: u64) {
        let mut st = lock(&self.state);
        st.transcripts.clear();
        st.seq.begin_epoch(epoch);
    }
}

fn ends_with_exchange(history: &[Message], sent: &str) -> bool {
    match history {
        [.., user, reply] => user.role == Role::User && user.content == sent && reply.role == Role::Assistant,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{ChatShape, Endpoint, MemoryGateway};
    use crate::gateway::ApiGateway;

    async fn setup(shape: ChatShape) -> (MemoryGateway, Arc<ProjectStore>, ChatSession, Session, ProjectId) {
        let mem = MemoryGateway::new().with_chat_shape(shape);
        let gw = ApiGateway::from(mem.clone());
        gw.register("a@x.com", "pw").await.unwrap();
        let s = Session::with_token(gw.login("a@x.com", "pw").await.unwrap().access_token);
        let store = Arc::new(ProjectStore::new(gw));
        let p = store.create(&s, "p", None).await.unwrap();
        let chat = ChatSession::new(store.clone());
        (mem, store, chat, s, p.id)
    }

    #[tokio::test]
    async fn history_reply_replaces_transcript() {
        let (_mem, _store, chat, s, id) = setup(ChatShape::History).await;
        let t = chat.send(&s, id, "hi").await.unwrap();
        assert_eq!(t, vec![Message::user("hi"), Message::assistant("Echo: hi")]);
    }

    #[tokio::test]
    async fn reply_only_appends_user_then_assistant() {
        let (_mem, _store, chat, s, id) = setup(ChatShape::ReplyOnly).await;
        chat.send(&s, id, "one").await.unwrap();
        let t = chat.send(&s, id, "two").await.unwrap();
        assert_eq!(
            t,
            vec![
                Message::user("one"),
                Message::assistant("Echo: one"),
                Message::user("two"),
                Message::assistant("Echo: two"),
            ]
        );
    }

    #[tokio::test]
    async fn empty_message_makes_no_request() {
        let (mem, _store, chat, s, id) = setup(ChatShape::History).await;
        assert_eq!(chat.send(&s, id, " \n").await, Err(ClientError::Validation { field: "message" }));
        assert_eq!(mem.call_count(Endpoint::SendChat), 0);
    }

    #[tokio::test]
    async fn unknown_project_is_refused() {
        let (mem, _store, chat, s, _id) = setup(ChatShape::History).await;
        let err = chat.send(&s, ProjectId(99), "hi").await.unwrap_err();
        assert_eq!(err, ClientError::UnknownProject(ProjectId(99)));
        assert_eq!(mem.call_count(Endpoint::SendChat), 0);
    }

    #[tokio::test]
    async fn failed_send_leaves_transcript_alone() {
        let (mem, _store, chat, s, id) = setup(ChatShape::History).await;
        chat.send(&s, id, "hi").await.unwrap();
        mem.fail_next(Endpoint::SendChat, ClientError::Api { status: 500, detail: "OpenRouter error".into() });
        assert!(chat.send(&s, id, "again").await.is_err());
        assert_eq!(chat.transcript(id).len(), 2);
    }

    #[tokio::test]
    async fn reset_clears_even_when_remote_fails() {
        let (mem, _store, chat, s, id) = setup(ChatShape::History).await;
        chat.send(&s, id, "hi").await.unwrap();
        mem.fail_next(Endpoint::ResetChat, ClientError::Transport("down".into()));
        let err = chat.reset(&s, id).await.unwrap_err();
        assert_eq!(err, ClientError::Transport("down".into()));
        assert!(chat.transcript(id).is_empty());
    }

    #[tokio::test]
    async fn transcript_survives_reselection() {
        let (_mem, store, chat, s, id) = setup(ChatShape::History).await;
        let other = store.create(&s, "other", None).await.unwrap();
        store.select(id).unwrap();
        chat.send(&s, id, "hi").await.unwrap();

        store.select(other.id).unwrap();
        assert!(chat.active_transcript().is_empty());
        store.select(id).unwrap();
        assert_eq!(chat.active_transcript().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_for_discarded_project_is_dropped() {
        let (mem, _store, chat, s, id) = setup(ChatShape::ReplyOnly).await;
        mem.delay_next(Endpoint::SendChat, std::time::Duration::from_millis(50));

        let discard_midway = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            chat.discard(id);
        };
        let (sent, ()) = tokio::join!(chat.send(&s, id, "hi"), discard_midway);

        assert!(sent.unwrap().is_empty());
        assert!(chat.transcript(id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reply_for_previous_identity_is_dropped() {
        let (mem, _store, chat, s, id) = setup(ChatShape::History).await;
        mem.delay_next(Endpoint::SendChat, std::time::Duration::from_millis(50));

        let switch_midway = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            chat.clear(s.epoch() + 1);
        };
        let (sent, ()) = tokio::join!(chat.send(&s, id, "hi"), switch_midway);

        assert!(sent.unwrap().is_empty());
        assert!(chat.transcript(id).is_empty());
    }

    #[test]
    fn exchange_detection() {
        let h = vec![Message::user("a"), Message::assistant("b")];
        assert!(ends_with_exchange(&h, "a"));
        assert!(!ends_with_exchange(&h, "x"));
        assert!(!ends_with_exchange(&h[..1], "a"));
    }
}
