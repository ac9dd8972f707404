//! WhatsApp JID helpers.

/// Server part of group chat JIDs.
pub const GROUP_SERVER: &str = "g.us";
/// Server part of individual user JIDs.
pub const USER_SERVER: &str = "s.whatsapp.net";

pub fn is_group_jid(jid: &str) -> bool {
    jid.rsplit_once('@')
        .is_some_and(|(_, server)| server == GROUP_SERVER)
}

/// Normalize a chat id into a sendable JID.
///
/// - bare phone numbers get the user server appended
/// - the device suffix (`:20` in `15037348571:20@s.whatsapp.net`) is removed
pub fn normalize_jid(chat_id: &str) -> String {
    match chat_id.split_once('@') {
        Some((user, server)) => {
            let user = user.split(':').next().unwrap_or(user);
            format!("{}@{}", user, server)
        }
        None => format!("{}@{}", chat_id, USER_SERVER),
    }
}
