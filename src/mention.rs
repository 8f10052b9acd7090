use teloxide::utils::markdown;

use crate::storage::ChatMembers;

/// Fixed reply when a mention is triggered in a chat with no stored members.
pub const NO_MEMBERS_PLACEHOLDER: &str =
    "No members recorded yet. The bot learns members as they write messages.";

/// Header line above the mention tokens (already MarkdownV2-escaped).
const MENTION_HEADER: &str = "📢 *Mentioning everyone\\!*";

/// Build the MarkdownV2 broadcast mentioning every stored member.
///
/// Members with a username are mentioned as `@username`; the rest get a
/// text-mention link `[name](tg://user?id=...)` so Telegram still notifies
/// them and the id stays traceable. First names come straight from users, so
/// they are escaped before being embedded in markup.
pub fn render_mentions(members: &ChatMembers) -> String {
    if members.is_empty() {
        return NO_MEMBERS_PLACEHOLDER.to_string();
    }

    let tokens: Vec<String> = members
        .iter()
        .map(|(user_id, record)| match &record.username {
            Some(username) => markdown::escape(&format!("@{}", username)),
            None => format!(
                "[{}](tg://user?id={})",
                markdown::escape(&record.first_name),
                user_id
            ),
        })
        .collect();

    format!("{}\n\n{}", MENTION_HEADER, tokens.join(" "))
}

/// Plain-text enumerated listing for the /members command.
pub fn render_member_list(members: &ChatMembers) -> String {
    if members.is_empty() {
        return "No members recorded yet. Start chatting and the bot will remember you!"
            .to_string();
    }

    let mut listing = format!("👥 Chat members ({}):\n", members.len());
    for (position, (user_id, record)) in members.iter().enumerate() {
        match &record.username {
            Some(username) => {
                listing.push_str(&format!(
                    "{}. @{} ({})\n",
                    position + 1,
                    username,
                    record.first_name
                ));
            }
            None => {
                listing.push_str(&format!(
                    "{}. {} (ID: {})\n",
                    position + 1,
                    record.first_name,
                    user_id
                ));
            }
        }
    }
    listing
}

/// One display token per joiner for welcome notices: handle if present,
/// otherwise first name.
pub fn joiner_names(joiners: &[(Option<String>, String)]) -> String {
    joiners
        .iter()
        .map(|(username, first_name)| match username {
            Some(username) => format!("@{}", username),
            None => first_name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
