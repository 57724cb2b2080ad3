//! Post lifecycle as an explicit transition table.
//!
//! A rule is looked up by `(current status, action)` and says what the next
//! status is, what the post must satisfy first, and who hears about it.
//! `trashed` is an orthogonal flag and never appears as a status here.

use crate::error::{AppError, FieldErrors};
use crate::models::{Caller, NotificationType, Post, PostStatus};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit,
    Publish,
    ReturnToDraft,
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    None,
    /// Non-empty title.
    Titled,
    /// Non-empty title and content, and at least one tag.
    Complete,
}

/// Who receives a notification when the rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Nobody,
    AdminsExceptActor,
    AuthorUnlessActor,
    Assignee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub from: PostStatus,
    pub action: Action,
    /// `None` keeps the current status.
    pub to: Option<PostStatus>,
    pub requirement: Requirement,
    pub notify: Audience,
    pub notification: Option<NotificationType>,
}

use Action::*;
use PostStatus::*;

pub const TRANSITIONS: &[Rule] = &[
    Rule { from: Draft, action: Submit, to: Some(Submitted), requirement: Requirement::Complete, notify: Audience::AdminsExceptActor, notification: Some(NotificationType::Submission) },
    Rule { from: Draft, action: Publish, to: Some(Published), requirement: Requirement::Complete, notify: Audience::AuthorUnlessActor, notification: Some(NotificationType::Approval) },
    Rule { from: Submitted, action: Publish, to: Some(Published), requirement: Requirement::Complete, notify: Audience::AuthorUnlessActor, notification: Some(NotificationType::Approval) },
    // Re-publishing is allowed and refreshes the approval fields.
    Rule { from: Published, action: Publish, to: Some(Published), requirement: Requirement::Complete, notify: Audience::AuthorUnlessActor, notification: Some(NotificationType::Approval) },
    Rule { from: Draft, action: ReturnToDraft, to: Some(Draft), requirement: Requirement::None, notify: Audience::Nobody, notification: None },
    Rule { from: Submitted, action: ReturnToDraft, to: Some(Draft), requirement: Requirement::None, notify: Audience::Nobody, notification: None },
    Rule { from: Draft, action: Assign, to: None, requirement: Requirement::Titled, notify: Audience::Assignee, notification: Some(NotificationType::Assignment) },
    Rule { from: Submitted, action: Assign, to: None, requirement: Requirement::Titled, notify: Audience::Assignee, notification: Some(NotificationType::Assignment) },
    Rule { from: Published, action: Assign, to: None, requirement: Requirement::Titled, notify: Audience::Assignee, notification: Some(NotificationType::Assignment) },
];

pub fn rule_for(from: PostStatus, action: Action) -> Option<&'static Rule> {
    TRANSITIONS.iter().find(|rule| rule.from == from && rule.action == action)
}

/// The action an edit requesting `target` status runs through.
pub fn action_for_status(target: PostStatus) -> Action {
    match target {
        Draft => ReturnToDraft,
        Submitted => Submit,
        Published => Publish,
    }
}

/// Looks up the rule and checks its requirement against `post`, which
/// should already carry any pending field edits.
pub fn plan(post: &Post, action: Action) -> Result<&'static Rule, AppError> {
    let rule = rule_for(post.status, action).ok_or_else(|| {
        AppError::invalid(
            "status",
            format!("cannot {:?} a post that is {}", action, post.status),
        )
    })?;
    check_requirement(rule.requirement, post).map_err(AppError::Validation)?;
    Ok(rule)
}

pub fn check_requirement(requirement: Requirement, post: &Post) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    match requirement {
        Requirement::None => {}
        Requirement::Titled => {
            if post.title.trim().is_empty() {
                errors.insert("title".to_string(), "a title is required".to_string());
            }
        }
        Requirement::Complete => {
            if post.title.trim().is_empty() {
                errors.insert("title".to_string(), "a title is required".to_string());
            }
            if post.content.trim().is_empty() {
                errors.insert("content".to_string(), "content is required".to_string());
            }
            if post.tags.is_empty() {
                errors.insert("tags".to_string(), "at least one tag is required".to_string());
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Applies the status-level effects of `rule` to `post`. Assignment fields
/// are set by the caller since they depend on the chosen assignee.
pub fn apply(rule: &Rule, post: &mut Post, actor: &Caller, now: DateTime<Utc>) {
    if let Some(next) = rule.to {
        post.status = next;
    }
    match rule.action {
        Submit => {
            post.submitted_at = Some(now);
        }
        Publish => {
            post.approved_by = Some(actor.id.clone());
            post.approved_at = Some(now);
            post.published_at = Some(post.published_at.unwrap_or(now));
        }
        ReturnToDraft => {}
        Assign => {
            post.trashed = false;
            post.trashed_at = None;
        }
    }
    post.updated_at = now;
}

/// Resolves the rule's audience to concrete user ids.
pub fn recipients(rule: &Rule, post: &Post, actor: &Caller, admin_ids: &[String]) -> Vec<String> {
    match rule.notify {
        Audience::Nobody => Vec::new(),
        Audience::AdminsExceptActor => admin_ids.iter().filter(|id| **id != actor.id).cloned().collect(),
        Audience::AuthorUnlessActor if post.author_id != actor.id => vec![post.author_id.clone()],
        Audience::AuthorUnlessActor => Vec::new(),
        Audience::Assignee => post.assigned_to.iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Tag};

    fn admin() -> Caller {
        Caller { id: "admin".to_string(), role: Role::Admin, suspended: false }
    }

    fn draft(with_tag: bool) -> Post {
        let now = Utc::now();
        Post {
            id: "p".to_string(),
            title: "Hello".to_string(),
            slug: "hello".to_string(),
            excerpt: String::new(),
            content: "World".to_string(),
            status: Draft,
            author_id: "author".to_string(),
            assigned_to: None,
            created_by: "author".to_string(),
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            admin_note: None,
            published_at: None,
            trashed: false,
            trashed_at: None,
            views: 0,
            created_at: now,
            updated_at: now,
            tags: if with_tag {
                vec![Tag { id: "t".to_string(), name: "general".to_string(), slug: "general".to_string() }]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn table_has_one_rule_per_key() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                assert!(!(a.from == b.from && a.action == b.action), "duplicate rule {:?}", a);
            }
        }
    }

    #[test]
    fn submit_only_from_draft() {
        assert!(rule_for(Draft, Submit).is_some());
        assert!(rule_for(Submitted, Submit).is_none());
        assert!(rule_for(Published, Submit).is_none());
    }

    #[test]
    fn published_never_returns_to_draft() {
        assert!(rule_for(Published, ReturnToDraft).is_none());
        assert!(rule_for(Submitted, ReturnToDraft).is_some());
    }

    #[test]
    fn submit_without_tags_reports_field() {
        let post = draft(false);
        match plan(&post, Submit) {
            Err(AppError::Validation(fields)) => {
                assert!(fields.contains_key("tags"));
                assert!(!fields.contains_key("title"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn assign_needs_only_a_title() {
        let mut post = draft(false);
        post.content.clear();
        assert!(plan(&post, Assign).is_ok());
        post.title = "   ".to_string();
        assert!(matches!(plan(&post, Assign), Err(AppError::Validation(_))));
    }

    #[test]
    fn publish_sets_approval_and_keeps_existing_publish_date() {
        let mut post = draft(true);
        let earlier = Utc::now() - chrono::Duration::days(3);
        post.published_at = Some(earlier);
        let rule = plan(&post, Publish).unwrap();
        let now = Utc::now();
        apply(rule, &mut post, &admin(), now);
        assert_eq!(post.status, Published);
        assert_eq!(post.approved_by.as_deref(), Some("admin"));
        assert_eq!(post.approved_at, Some(now));
        assert_eq!(post.published_at, Some(earlier));
    }

    #[test]
    fn submission_goes_to_every_admin_but_the_actor() {
        let post = draft(true);
        let rule = rule_for(Draft, Submit).unwrap();
        let actor = admin();
        let admins = vec!["admin".to_string(), "other".to_string()];
        assert_eq!(recipients(rule, &post, &actor, &admins), vec!["other".to_string()]);
    }

    #[test]
    fn approval_skips_self_published_posts() {
        let mut post = draft(true);
        post.author_id = "admin".to_string();
        let rule = rule_for(Draft, Publish).unwrap();
        assert!(recipients(rule, &post, &admin(), &[]).is_empty());
    }
}
