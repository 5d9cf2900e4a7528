use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::users;

/// Which side of the board a user works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Carrier,
    Broker,
    Shipper,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Carrier => "carrier",
            AccountType::Broker => "broker",
            AccountType::Shipper => "shipper",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "carrier" => Ok(AccountType::Carrier),
            "broker" => Ok(AccountType::Broker),
            "shipper" => Ok(AccountType::Shipper),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A stored value did not match any known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant `{0}`")]
pub struct UnknownVariant(pub String);

/// Row in the `users` table. Only the columns the realtime and booking paths
/// read are mapped here.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub email: String,
    pub company: Option<String>,
    pub account_type: String,
    pub role: String,
    pub has_mc: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Company name shown to other participants; empty when unset.
    pub fn display_company(&self) -> &str {
        self.company.as_deref().unwrap_or("")
    }
}
