use crate::{config::Config, domain::UserId};

/// How the chat platform sees the invoking user in the current channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatStanding {
    /// One-on-one chat with the bot; the user administers it.
    PrivateChat,
    /// Owner or administrator of a group.
    Privileged,
    Member,
}

/// Who may run `enable`, `disable` and `reset_highscore`.
#[derive(Clone, Debug, Default)]
pub struct AdminPolicy {
    extra_admins: Vec<i64>,
}

impl AdminPolicy {
    pub fn new(extra_admins: Vec<i64>) -> Self {
        Self { extra_admins }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.admin_users.clone())
    }

    pub fn is_listed(&self, user_id: Option<UserId>) -> bool {
        let Some(user_id) = user_id else {
            return false;
        };
        self.extra_admins.contains(&user_id.0)
    }

    /// Anonymous senders (`user_id == None`) are never admins.
    pub fn may_administer(&self, user_id: Option<UserId>, standing: ChatStanding) -> bool {
        if user_id.is_none() {
            return false;
        }
        match standing {
            ChatStanding::PrivateChat | ChatStanding::Privileged => true,
            ChatStanding::Member => self.is_listed(user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_need_listing() {
        let policy = AdminPolicy::new(vec![42]);
        assert!(policy.may_administer(Some(UserId(42)), ChatStanding::Member));
        assert!(!policy.may_administer(Some(UserId(7)), ChatStanding::Member));
    }

    #[test]
    fn chat_admins_and_private_chats_pass() {
        let policy = AdminPolicy::default();
        assert!(policy.may_administer(Some(UserId(7)), ChatStanding::Privileged));
        assert!(policy.may_administer(Some(UserId(7)), ChatStanding::PrivateChat));
    }

    #[test]
    fn anonymous_sender_is_rejected() {
        let policy = AdminPolicy::new(vec![42]);
        assert!(!policy.is_listed(None));
        assert!(!policy.may_administer(None, ChatStanding::Privileged));
    }
}
