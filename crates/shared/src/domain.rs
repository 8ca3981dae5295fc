use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(SessionId);
id_newtype!(MessageId);

/// Locally cached descriptor of the chat the user currently belongs to.
///
/// Exactly one of these is persisted per profile; it is replaced wholesale
/// when a chat is created or joined and removed on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub key: String,
    pub creator_account: String,
    pub my_account: String,
}

impl ChatSession {
    /// The other participant's display name, when it is known.
    ///
    /// The creator does not know the joiner's name until a message arrives,
    /// so for a session we created ourselves this is `None`.
    pub fn partner_account(&self) -> Option<&str> {
        if self.creator_account == self.my_account {
            None
        } else {
            Some(&self.creator_account)
        }
    }
}
