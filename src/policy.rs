//! Authorization decisions for every staff operation.
//!
//! Each function is pure: it looks only at the caller snapshot and the
//! target entity it is handed, and returns a [`Decision`]. Suspension is
//! checked before anything else and reported with its own reason so the
//! session layer can force a sign-out.

use crate::error::AppError;
use crate::models::{Caller, Post, PostStatus, User};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Suspended,
    AdminOnly,
    NotOwner,
    PublishedLocked,
    NotDeletable,
    MasterProtected,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenyReason::Suspended => "account is suspended",
            DenyReason::AdminOnly => "only administrators may do this",
            DenyReason::NotOwner => "you are neither the author nor the assignee of this post",
            DenyReason::PublishedLocked => "published posts can only be changed by administrators",
            DenyReason::NotDeletable => "only unassigned drafts can be deleted by their author",
            DenyReason::MasterProtected => "the master administrator cannot be modified",
        };
        f.write_str(text)
    }
}

#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::Suspended) => Err(AppError::Suspended),
            Decision::Deny(reason) => Err(AppError::Forbidden(reason)),
        }
    }
}

fn gate(caller: &Caller, rule: impl FnOnce() -> Decision) -> Decision {
    if caller.suspended {
        return Decision::Deny(DenyReason::Suspended);
    }
    rule()
}

fn admin_only(caller: &Caller) -> Decision {
    gate(caller, || {
        if caller.is_admin() {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::AdminOnly)
        }
    })
}

fn is_involved(caller: &Caller, post: &Post) -> bool {
    post.is_author(&caller.id) || post.is_assignee(&caller.id)
}

/// Any signed-in, unsuspended staff member.
pub fn can_act(caller: &Caller) -> Decision {
    gate(caller, || Decision::Allow)
}

pub fn can_edit_post(caller: &Caller, post: &Post) -> Decision {
    gate(caller, || {
        if caller.is_admin() {
            Decision::Allow
        } else if !is_involved(caller, post) {
            Decision::Deny(DenyReason::NotOwner)
        } else if post.status == PostStatus::Published {
            Decision::Deny(DenyReason::PublishedLocked)
        } else {
            Decision::Allow
        }
    })
}

/// Submission for review belongs to the people working on the post.
pub fn can_submit(caller: &Caller, post: &Post) -> Decision {
    gate(caller, || {
        if is_involved(caller, post) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NotOwner)
        }
    })
}

pub fn can_publish(caller: &Caller) -> Decision {
    admin_only(caller)
}

pub fn can_return_to_draft(caller: &Caller) -> Decision {
    admin_only(caller)
}

pub fn can_delete_post(caller: &Caller, post: &Post) -> Decision {
    gate(caller, || {
        if caller.is_admin() {
            Decision::Allow
        } else if !post.is_author(&caller.id) {
            Decision::Deny(DenyReason::NotOwner)
        } else if post.status != PostStatus::Draft || post.assigned_to.is_some() {
            Decision::Deny(DenyReason::NotDeletable)
        } else {
            Decision::Allow
        }
    })
}

pub fn can_view_post(caller: &Caller, post: &Post) -> Decision {
    gate(caller, || {
        if caller.is_admin() || is_involved(caller, post) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NotOwner)
        }
    })
}

/// Notes are open to the same people who can see the post's internals,
/// whatever its status.
pub fn can_add_note(caller: &Caller, post: &Post) -> Decision {
    can_view_post(caller, post)
}

pub fn can_assign(caller: &Caller) -> Decision {
    admin_only(caller)
}

pub fn can_trash(caller: &Caller) -> Decision {
    admin_only(caller)
}

pub fn can_manage_users(caller: &Caller) -> Decision {
    admin_only(caller)
}

pub fn can_manage_tags(caller: &Caller) -> Decision {
    admin_only(caller)
}

pub fn can_manage_invites(caller: &Caller) -> Decision {
    admin_only(caller)
}

pub fn can_review_queue(caller: &Caller) -> Decision {
    admin_only(caller)
}

/// Role change, suspension and deletion. The master administrator is
/// untouchable no matter who asks.
pub fn can_mutate_user(caller: &Caller, target: &User) -> Decision {
    match can_manage_users(caller) {
        Decision::Allow if target.is_master => Decision::Deny(DenyReason::MasterProtected),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;

    fn caller(id: &str, role: Role) -> Caller {
        Caller { id: id.to_string(), role, suspended: false }
    }

    fn post(author: &str, assignee: Option<&str>, status: PostStatus) -> Post {
        let now = Utc::now();
        Post {
            id: "p1".to_string(),
            title: "Hello".to_string(),
            slug: "hello".to_string(),
            excerpt: String::new(),
            content: "World".to_string(),
            status,
            author_id: author.to_string(),
            assigned_to: assignee.map(str::to_string),
            created_by: author.to_string(),
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
            tags: Vec::new(),
        }
    }

    fn user(id: &str, role: Role, is_master: bool) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            display_name: id.to_string(),
            role,
            suspended: false,
            is_master,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn admin_edits_anything() {
        let admin = caller("a", Role::Admin);
        assert!(can_edit_post(&admin, &post("e", None, PostStatus::Published)).is_allowed());
    }

    #[test]
    fn owner_and_assignee_edit_until_published() {
        let author = caller("e", Role::Editor);
        let assignee = caller("x", Role::Editor);
        let draft = post("e", Some("x"), PostStatus::Draft);
        assert!(can_edit_post(&author, &draft).is_allowed());
        assert!(can_edit_post(&assignee, &draft).is_allowed());

        let live = post("e", Some("x"), PostStatus::Published);
        assert_eq!(can_edit_post(&author, &live), Decision::Deny(DenyReason::PublishedLocked));
        assert_eq!(can_edit_post(&assignee, &live), Decision::Deny(DenyReason::PublishedLocked));
    }

    #[test]
    fn only_involved_staff_submit() {
        let draft = post("e", Some("x"), PostStatus::Draft);
        assert!(can_submit(&caller("e", Role::Editor), &draft).is_allowed());
        assert!(can_submit(&caller("x", Role::Editor), &draft).is_allowed());
        assert_eq!(
            can_submit(&caller("a", Role::Admin), &draft),
            Decision::Deny(DenyReason::NotOwner)
        );
    }

    #[test]
    fn stranger_cannot_edit_or_view() {
        let stranger = caller("s", Role::Editor);
        let draft = post("e", None, PostStatus::Draft);
        assert_eq!(can_edit_post(&stranger, &draft), Decision::Deny(DenyReason::NotOwner));
        assert_eq!(can_view_post(&stranger, &draft), Decision::Deny(DenyReason::NotOwner));
    }

    #[test]
    fn delete_rules() {
        let author = caller("e", Role::Editor);
        assert!(can_delete_post(&author, &post("e", None, PostStatus::Draft)).is_allowed());
        assert_eq!(
            can_delete_post(&author, &post("e", Some("e"), PostStatus::Draft)),
            Decision::Deny(DenyReason::NotDeletable)
        );
        assert_eq!(
            can_delete_post(&author, &post("e", None, PostStatus::Submitted)),
            Decision::Deny(DenyReason::NotDeletable)
        );
        // assignees never hard-delete
        let assignee = caller("x", Role::Editor);
        assert_eq!(
            can_delete_post(&assignee, &post("e", Some("x"), PostStatus::Draft)),
            Decision::Deny(DenyReason::NotOwner)
        );
        let admin = caller("a", Role::Admin);
        assert!(can_delete_post(&admin, &post("e", Some("x"), PostStatus::Published)).is_allowed());
    }

    #[test]
    fn suspension_short_circuits_every_check() {
        let mut admin = caller("a", Role::Admin);
        admin.suspended = true;
        let p = post("a", None, PostStatus::Draft);
        let target = user("t", Role::Editor, false);
        for decision in [
            can_act(&admin),
            can_edit_post(&admin, &p),
            can_publish(&admin),
            can_delete_post(&admin, &p),
            can_view_post(&admin, &p),
            can_assign(&admin),
            can_manage_users(&admin),
            can_manage_tags(&admin),
            can_mutate_user(&admin, &target),
        ] {
            assert_eq!(decision, Decision::Deny(DenyReason::Suspended));
        }
        assert!(matches!(can_publish(&admin).into_result(), Err(AppError::Suspended)));
    }

    #[test]
    fn master_is_protected_from_other_admins() {
        let admin = caller("a", Role::Admin);
        let master = user("m", Role::Admin, true);
        assert_eq!(can_mutate_user(&admin, &master), Decision::Deny(DenyReason::MasterProtected));
        assert!(can_mutate_user(&admin, &user("t", Role::Editor, false)).is_allowed());
        assert_eq!(
            can_mutate_user(&caller("e", Role::Editor), &user("t", Role::Editor, false)),
            Decision::Deny(DenyReason::AdminOnly)
        );
    }

    #[test]
    fn editors_cannot_run_admin_operations() {
        let editor = caller("e", Role::Editor);
        for decision in [
            can_publish(&editor),
            can_assign(&editor),
            can_trash(&editor),
            can_manage_users(&editor),
            can_manage_tags(&editor),
            can_manage_invites(&editor),
            can_review_queue(&editor),
        ] {
            assert_eq!(decision, Decision::Deny(DenyReason::AdminOnly));
        }
    }
}
