//! Fixed-capacity user table
//!
//! Entry 0 is the administrator (`admin`, group `GRP0`); the table holds at
//! most [`MAX_USERS`] entries with names up to [`MAX_USER_NAME`] characters.
//! When nobody is logged in, filesystem operations run as the default shell
//! identity `USR0`.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::FsError;

/// Maximum entries in the user table.
pub const MAX_USERS: usize = 20;

/// Maximum user-name length.
pub const MAX_USER_NAME: usize = 8;

/// Identity used when no user is logged in.
pub const SHELL_USER: &str = "USR0";

/// Group of the shell identity and the administrator.
pub const SHELL_GROUP: &str = "GRP0";

/// Name of the administrator (entry 0).
pub const ADMIN_USER: &str = "admin";

/// One user-table entry.
#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub group: String,
    password: Vec<u16>,
}

/// Per-byte squaring encode applied to stored passwords.
fn encode(password: &str) -> Vec<u16> {
    password
        .bytes()
        .map(|b| u16::from(b).wrapping_mul(u16::from(b)))
        .collect()
}

/// The user table plus the currently-logged-in entry, if any.
#[derive(Debug)]
pub struct UserTable {
    users: Vec<User>,
    current: Option<usize>,
}

impl UserTable {
    /// Build the table with the administrator pre-installed.
    pub fn new(admin_password: &str) -> UserTable {
        UserTable {
            users: alloc::vec![User {
                name: ADMIN_USER.to_string(),
                group: SHELL_GROUP.to_string(),
                password: encode(admin_password),
            }],
            current: None,
        }
    }

    /// Name and group the filesystem should attribute operations to.
    pub fn current_identity(&self) -> (&str, &str) {
        match self.current {
            Some(i) => (&self.users[i].name, &self.users[i].group),
            None => (SHELL_USER, SHELL_GROUP),
        }
    }

    /// Index of the current user in the table, if logged in.
    pub fn current_index(&self) -> Option<u8> {
        self.current.map(|i| i as u8)
    }

    /// Whether the administrator is the current user.
    pub fn is_admin(&self) -> bool {
        self.current == Some(0)
    }

    pub fn name_of(&self, idx: u8) -> Option<&str> {
        self.users.get(idx as usize).map(|u| u.name.as_str())
    }

    pub fn group_of(&self, idx: u8) -> Option<&str> {
        self.users.get(idx as usize).map(|u| u.group.as_str())
    }

    /// Log in as `name`, replacing any previous session.
    pub fn login(&mut self, name: &str, password: &str) -> Result<(), FsError> {
        let idx = self
            .users
            .iter()
            .position(|u| u.name == name)
            .ok_or(FsError::UnknownUser)?;
        if self.users[idx].password != encode(password) {
            return Err(FsError::BadCredentials);
        }
        self.current = Some(idx);
        Ok(())
    }

    /// Drop back to the shell identity.
    pub fn logout(&mut self) {
        self.current = None;
    }

    /// Add a user. Administrator only.
    pub fn add_user(&mut self, name: &str, group: &str, password: &str) -> Result<(), FsError> {
        if !self.is_admin() {
            return Err(FsError::PermissionDenied);
        }
        if name.is_empty() || name.len() > MAX_USER_NAME {
            return Err(FsError::NameTooLong);
        }
        if self.users.len() >= MAX_USERS {
            return Err(FsError::UserExhausted);
        }
        if self.users.iter().any(|u| u.name == name) {
            return Err(FsError::UserExists);
        }
        self.users.push(User {
            name: name.to_string(),
            group: group.to_string(),
            password: encode(password),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> UserTable {
        UserTable::new("secret")
    }

    #[test]
    fn shell_identity_when_nobody_logged_in() {
        let t = table();
        assert_eq!(t.current_identity(), (SHELL_USER, SHELL_GROUP));
        assert!(!t.is_admin());
    }

    #[test]
    fn admin_login_round_trip() {
        let mut t = table();
        assert_eq!(t.login("admin", "wrong"), Err(FsError::BadCredentials));
        t.login("admin", "secret").unwrap();
        assert!(t.is_admin());
        assert_eq!(t.current_identity().0, "admin");
        t.logout();
        assert!(!t.is_admin());
    }

    #[test]
    fn only_admin_adds_users() {
        let mut t = table();
        assert_eq!(
            t.add_user("kim", "GRP1", "pw"),
            Err(FsError::PermissionDenied)
        );
        t.login("admin", "secret").unwrap();
        t.add_user("kim", "GRP1", "pw").unwrap();
        t.logout();
        t.login("kim", "pw").unwrap();
        assert_eq!(t.current_identity(), ("kim", "GRP1"));
    }

    #[test]
    fn name_length_is_enforced() {
        let mut t = table();
        t.login("admin", "secret").unwrap();
        assert_eq!(
            t.add_user("ninechars", "G", "pw"),
            Err(FsError::NameTooLong)
        );
    }

    #[test]
    fn table_capacity_is_enforced() {
        let mut t = table();
        t.login("admin", "secret").unwrap();
        for i in 1..MAX_USERS {
            t.add_user(&alloc::format!("u{}", i), "G", "pw").unwrap();
        }
        assert_eq!(t.add_user("extra", "G", "pw"), Err(FsError::UserExhausted));
    }
}
