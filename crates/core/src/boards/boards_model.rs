//! Board and reward models.
//!
//! `BoardDocument` is the loosely-typed shape delivered by the remote
//! collaborator. It only enters the engine after conversion into `Board`,
//! which rejects values the rest of the crate assumes cannot happen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{Error, Result};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque board identifier.
    BoardId
);
string_id!(
    /// Reward identifier, unique within a board.
    RewardId
);
string_id!(
    /// Authenticated user identifier.
    UserId
);

/// A reward a child can request with tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub name: String,
    pub cost: u64,
    pub icon: String,
    /// Requested by a child and awaiting parent confirmation.
    pub pending: bool,
}

/// Validated board state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub owner: Option<UserId>,
    pub total_token: u64,
    pub rewards: HashMap<RewardId, Reward>,
    pub last_token_update_time: Option<DateTime<Utc>>,
    /// Highest action sequence the server has applied, per user.
    pub last_action_sequences: HashMap<UserId, u64>,
}

impl Board {
    pub fn new(id: impl Into<BoardId>) -> Self {
        Self {
            id: id.into(),
            owner: None,
            total_token: 0,
            rewards: HashMap::new(),
            last_token_update_time: None,
            last_action_sequences: HashMap::new(),
        }
    }

    pub fn reward(&self, reward_id: &RewardId) -> Option<&Reward> {
        self.rewards.get(reward_id)
    }

    /// Last sequence the server has processed for `user_id`.
    pub fn last_sequence_for(&self, user_id: &UserId) -> Option<u64> {
        self.last_action_sequences.get(user_id).copied()
    }

    /// Rewards currently awaiting confirmation, sorted by id.
    pub fn pending_rewards(&self) -> Vec<(&RewardId, &Reward)> {
        let mut pending = self
            .rewards
            .iter()
            .filter(|(_, reward)| reward.pending)
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| a.0.cmp(b.0));
        pending
    }
}

/// Reward entry as stored in the remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardDocument {
    pub name: String,
    pub cost: i64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub pending: bool,
}

/// Board document as delivered by the remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardDocument {
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub total_token: i64,
    #[serde(default)]
    pub rewards: HashMap<String, RewardDocument>,
    #[serde(default)]
    pub last_token_update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_action_sequences: HashMap<String, i64>,
}

fn non_negative(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::invalid_document(format!("{} must be >= 0, got {}", field, value)))
}

impl TryFrom<BoardDocument> for Board {
    type Error = Error;

    fn try_from(doc: BoardDocument) -> Result<Self> {
        if doc.id.trim().is_empty() {
            return Err(Error::invalid_document("board id is empty"));
        }

        let total_token = non_negative(doc.total_token, "totalToken")?;

        let mut rewards = HashMap::with_capacity(doc.rewards.len());
        for (reward_id, reward) in doc.rewards {
            if reward_id.trim().is_empty() {
                return Err(Error::invalid_document("reward id is empty"));
            }
            let cost = non_negative(reward.cost, &format!("rewards.{}.cost", reward_id))?;
            rewards.insert(
                RewardId::from(reward_id),
                Reward {
                    name: reward.name,
                    cost,
                    icon: reward.icon,
                    pending: reward.pending,
                },
            );
        }

        let mut last_action_sequences = HashMap::with_capacity(doc.last_action_sequences.len());
        for (user_id, sequence) in doc.last_action_sequences {
            let sequence = non_negative(sequence, &format!("lastActionSequences.{}", user_id))?;
            last_action_sequences.insert(UserId::from(user_id), sequence);
        }

        Ok(Board {
            id: BoardId::from(doc.id),
            owner: doc.owner.filter(|o| !o.is_empty()).map(UserId::from),
            total_token,
            rewards,
            last_token_update_time: doc.last_token_update_time,
            last_action_sequences,
        })
    }
}

impl From<&Board> for BoardDocument {
    fn from(board: &Board) -> Self {
        BoardDocument {
            id: board.id.to_string(),
            owner: board.owner.as_ref().map(ToString::to_string),
            total_token: i64::try_from(board.total_token).unwrap_or(i64::MAX),
            rewards: board
                .rewards
                .iter()
                .map(|(id, reward)| {
                    (
                        id.to_string(),
                        RewardDocument {
                            name: reward.name.clone(),
                            cost: i64::try_from(reward.cost).unwrap_or(i64::MAX),
                            icon: reward.icon.clone(),
                            pending: reward.pending,
                        },
                    )
                })
                .collect(),
            last_token_update_time: board.last_token_update_time,
            last_action_sequences: board
                .last_action_sequences
                .iter()
                .map(|(user, seq)| (user.to_string(), i64::try_from(*seq).unwrap_or(i64::MAX)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_json() -> serde_json::Value {
        serde_json::json!({
            "id": "board-1",
            "owner": "parent-1",
            "totalToken": 12,
            "rewards": {
                "r1": { "name": "Ice cream", "cost": 10, "icon": "🍦", "pending": false },
                "r2": { "name": "Cinema", "cost": 40, "icon": "🎬", "pending": true }
            },
            "lastTokenUpdateTime": "2026-01-01T10:00:00Z",
            "lastActionSequences": { "child-1": 7 }
        })
    }

    #[test]
    fn valid_document_converts_to_board() {
        let doc: BoardDocument = serde_json::from_value(document_json()).expect("decode");
        let board = Board::try_from(doc).expect("valid");

        assert_eq!(board.id, BoardId::from("board-1"));
        assert_eq!(board.owner, Some(UserId::from("parent-1")));
        assert_eq!(board.total_token, 12);
        assert_eq!(board.reward(&RewardId::from("r1")).map(|r| r.cost), Some(10));
        assert_eq!(board.last_sequence_for(&UserId::from("child-1")), Some(7));
        assert_eq!(board.pending_rewards().len(), 1);
        assert!(board.last_token_update_time.is_some());
    }

    #[test]
    fn missing_optional_fields_default() {
        let doc: BoardDocument =
            serde_json::from_value(serde_json::json!({ "id": "b", "totalToken": 0 }))
                .expect("decode");
        let board = Board::try_from(doc).expect("valid");
        assert!(board.rewards.is_empty());
        assert!(board.last_action_sequences.is_empty());
        assert_eq!(board.last_token_update_time, None);
    }

    #[test]
    fn negative_balance_is_rejected() {
        let mut json = document_json();
        json["totalToken"] = serde_json::json!(-1);
        let doc: BoardDocument = serde_json::from_value(json).expect("decode");
        let err = Board::try_from(doc).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument(msg) if msg.contains("totalToken")));
    }

    #[test]
    fn negative_cost_and_sequence_are_rejected() {
        let mut json = document_json();
        json["rewards"]["r1"]["cost"] = serde_json::json!(-5);
        let doc: BoardDocument = serde_json::from_value(json).expect("decode");
        assert!(Board::try_from(doc).is_err());

        let mut json = document_json();
        json["lastActionSequences"]["child-1"] = serde_json::json!(-2);
        let doc: BoardDocument = serde_json::from_value(json).expect("decode");
        assert!(Board::try_from(doc).is_err());
    }

    #[test]
    fn empty_board_id_is_rejected() {
        let mut json = document_json();
        json["id"] = serde_json::json!(" ");
        let doc: BoardDocument = serde_json::from_value(json).expect("decode");
        assert!(Board::try_from(doc).is_err());
    }

    #[test]
    fn board_converts_back_to_document() {
        let doc: BoardDocument = serde_json::from_value(document_json()).expect("decode");
        let board = Board::try_from(doc.clone()).expect("valid");
        assert_eq!(BoardDocument::from(&board), doc);
    }
}
