//! RPC boundary of `user.UserService`.
//!
//! A call is addressed by package, service and method name:
//! `POST /user.UserService/GetUserById` with a JSON message as body.
//! Success answers `200` with the response message, any other status carries
//! a [`schema::Fault`].

pub mod client;
pub mod dispatcher;
pub mod schema;
pub mod server;

use std::fmt;

/// Package declaring the service.
pub const PACKAGE: &str = "user";
/// Service name inside [`PACKAGE`].
pub const SERVICE: &str = "UserService";
/// Fully qualified service name used for addressing.
pub const SERVICE_NAME: &str = "user.UserService";

/// Operations exposed by `user.UserService`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    GetUserById,
    CreateUser,
    UpdateUser,
    DeleteUser,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::GetUserById,
        Method::CreateUser,
        Method::UpdateUser,
        Method::DeleteUser,
    ];

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetUserById => "GetUserById",
            Self::CreateUser => "CreateUser",
            Self::UpdateUser => "UpdateUser",
            Self::DeleteUser => "DeleteUser",
        }
    }

    /// Relative path of the method, e.g. `user.UserService/CreateUser`.
    pub fn path(&self) -> String {
        format!("{SERVICE_NAME}/{}", self.as_str())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
