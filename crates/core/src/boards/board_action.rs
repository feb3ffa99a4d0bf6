//! Local board mutations and the remote calls that confirm them.

use serde::{Deserialize, Serialize};

use super::boards_model::{Board, BoardId, RewardId};

/// A user-initiated board mutation.
///
/// `apply` predicts the effect locally; `remote_call` builds the request the
/// server executes as the authoritative version of the same mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardAction {
    AddToken,
    ToggleReward(RewardId),
    ValidateReward(RewardId),
}

impl BoardAction {
    /// Pure prediction of this action over `board`.
    ///
    /// Actions targeting a reward that no longer exists, and toggles that
    /// would need more tokens than available, leave the board unchanged.
    pub fn apply(&self, mut board: Board) -> Board {
        match self {
            BoardAction::AddToken => {
                board.total_token = board.total_token.saturating_add(1);
            }
            BoardAction::ToggleReward(reward_id) => {
                let total = board.total_token;
                let Some(reward) = board.rewards.get_mut(reward_id) else {
                    return board;
                };
                if reward.pending {
                    reward.pending = false;
                    board.total_token = total.saturating_add(reward.cost);
                } else if total >= reward.cost {
                    reward.pending = true;
                    board.total_token = total - reward.cost;
                }
            }
            BoardAction::ValidateReward(reward_id) => {
                if let Some(reward) = board.rewards.get_mut(reward_id) {
                    reward.pending = false;
                }
            }
        }
        board
    }

    /// Build the remote call for this action, tagged with `sequence`.
    pub fn remote_call(&self, board_id: &BoardId, sequence: u64) -> BoardCall {
        match self {
            BoardAction::AddToken => BoardCall::AddToken(AddTokenRequest {
                board_id: board_id.clone(),
                sequence,
            }),
            BoardAction::ToggleReward(reward_id) => BoardCall::ToggleReward(RewardRequest {
                board_id: board_id.clone(),
                reward_id: reward_id.clone(),
                sequence,
            }),
            BoardAction::ValidateReward(reward_id) => BoardCall::ConfirmReward(RewardRequest {
                board_id: board_id.clone(),
                reward_id: reward_id.clone(),
                sequence,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoardAction::AddToken => "add_token",
            BoardAction::ToggleReward(_) => "toggle_reward",
            BoardAction::ValidateReward(_) => "validate_reward",
        }
    }
}

/// Payload of the `addToken` callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTokenRequest {
    pub board_id: BoardId,
    pub sequence: u64,
}

/// Payload of the `toggleReward` and `confirmReward` callables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRequest {
    pub board_id: BoardId,
    pub reward_id: RewardId,
    pub sequence: u64,
}

/// A remote mutating call, serialized as its callable payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BoardCall {
    AddToken(AddTokenRequest),
    ToggleReward(RewardRequest),
    ConfirmReward(RewardRequest),
}

impl BoardCall {
    /// Callable function name.
    pub fn function_name(&self) -> &'static str {
        match self {
            BoardCall::AddToken(_) => "addToken",
            BoardCall::ToggleReward(_) => "toggleReward",
            BoardCall::ConfirmReward(_) => "confirmReward",
        }
    }

    pub fn board_id(&self) -> &BoardId {
        match self {
            BoardCall::AddToken(req) => &req.board_id,
            BoardCall::ToggleReward(req) | BoardCall::ConfirmReward(req) => &req.board_id,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            BoardCall::AddToken(req) => req.sequence,
            BoardCall::ToggleReward(req) | BoardCall::ConfirmReward(req) => req.sequence,
        }
    }
}
