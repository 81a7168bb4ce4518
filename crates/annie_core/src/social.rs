//! Group chats and the social feed.

use crate::settings::UserPersona;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// The id recorded in `likes` for the local user.
pub const LOCAL_USER_ID: &str = "user";

pub(crate) fn avatar_for(name: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("https://ui-avatars.com/api/?name={}&background=random", encoded)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scenario: String,
}

impl CharacterGroup {
    /// Create a group. A group needs a name and at least two members.
    pub fn new(name: &str, members: Vec<String>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Invalid("group name is required".into()));
        }
        if members.len() < 2 {
            return Err(Error::Invalid(format!(
                "a group needs at least 2 members, got {}",
                members.len()
            )));
        }
        Ok(Self {
            id: format!("g-{}", crate::now_millis()),
            name: name.to_string(),
            avatar: avatar_for(name),
            description: format!("Group with {} members", members.len()),
            scenario: "Generic group chat".to_string(),
            members,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    pub content: String,
    pub timestamp: i64,
}

/// A post in the character social feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moment {
    pub id: String,
    pub character_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    pub timestamp: i64,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Moment {
    pub fn new(character_id: &str, content: &str, image_prompt: Option<&str>, image_url: Option<String>) -> Self {
        let now = crate::now_millis();
        Self {
            id: format!("m-{}", now),
            character_id: character_id.to_string(),
            content: content.to_string(),
            image_prompts: Some(image_prompt.map(|p| vec![p.to_string()]).unwrap_or_default()),
            image_urls: Some(image_url.map(|u| vec![u]).unwrap_or_default()),
            timestamp: now,
            likes: vec![],
            comments: vec![],
        }
    }

    pub fn liked_by_user(&self) -> bool {
        self.likes.iter().any(|id| id == LOCAL_USER_ID)
    }

    /// Flip the local user's like. Returns the new state.
    pub fn toggle_like(&mut self) -> bool {
        if self.liked_by_user() {
            self.likes.retain(|id| id != LOCAL_USER_ID);
            false
        } else {
            self.likes.push(LOCAL_USER_ID.to_string());
            true
        }
    }

    /// Append a comment from the local user. Blank text is rejected.
    pub fn add_comment(&mut self, persona: &UserPersona, text: &str) -> Result<&Comment> {
        if text.trim().is_empty() {
            return Err(Error::Invalid("comment is empty".into()));
        }
        self.comments.push(Comment {
            id: format!("c-{}", crate::now_millis()),
            user_id: LOCAL_USER_ID.to_string(),
            user_name: persona.name.clone(),
            user_avatar: Some(persona.avatar.clone()),
            content: text.to_string(),
            timestamp: crate::now_millis(),
        });
        Ok(&self.comments[self.comments.len() - 1])
    }
}

/// New moments go to the top of the feed.
pub fn prepend_moment(feed: &mut Vec<Moment>, moment: Moment) {
    feed.insert(0, moment);
}

pub fn find_moment_mut<'a>(feed: &'a mut [Moment], id: &str) -> Result<&'a mut Moment> {
    feed.iter_mut()
        .find(|m| m.id == id)
        .ok_or_else(|| Error::NotFound(format!("moment {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_requires_two_members() {
        assert!(CharacterGroup::new("Trio", vec!["a".into()]).is_err());
        assert!(CharacterGroup::new("   ", vec!["a".into(), "b".into()]).is_err());
        let g = CharacterGroup::new("Night Owls", vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(g.description, "Group with 2 members");
        assert_eq!(g.scenario, "Generic group chat");
        assert!(g.id.starts_with("g-"));
        assert!(g.avatar.contains("name=Night+Owls"));
    }

    #[test]
    fn test_toggle_like() {
        let mut m = Moment::new("c1", "sunny day", None, None);
        assert!(m.toggle_like());
        assert_eq!(m.likes, vec!["user".to_string()]);
        assert!(!m.toggle_like());
        assert!(m.likes.is_empty());
    }

    #[test]
    fn test_add_comment() {
        let mut m = Moment::new("c1", "sunny day", Some("beach"), Some("http://img".into()));
        let persona = UserPersona::default();
        assert!(m.add_comment(&persona, "  ").is_err());
        let c = m.add_comment(&persona, "nice!").unwrap();
        assert_eq!(c.user_id, "user");
        assert_eq!(c.user_name, "User");
        assert_eq!(m.image_prompts, Some(vec!["beach".to_string()]));
    }

    #[test]
    fn test_prepend_and_find() {
        let mut feed = vec![Moment::new("c1", "old", None, None)];
        let mut newer = Moment::new("c2", "new", None, None);
        newer.id = "m-new".into();
        prepend_moment(&mut feed, newer);
        assert_eq!(feed[0].content, "new");
        assert!(find_moment_mut(&mut feed, "m-new").is_ok());
        assert!(find_moment_mut(&mut feed, "missing").is_err());
    }
}
