use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: String,
    pub nickname: String,
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub score: i64,
}

/// The signed-in user, as far as the real-time layer needs to know it.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub nickname: String,
}

impl From<&UserSummary> for UserIdentity {
    fn from(user: &UserSummary) -> Self {
        Self {
            user_id: user.user_id.clone(),
            nickname: user.nickname.clone(),
        }
    }
}
