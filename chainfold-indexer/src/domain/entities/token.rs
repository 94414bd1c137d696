//! NFT collection (token contract)

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{DecodeError, EntityKind, EventConverter, ReduceError};
use crate::domain::log::{EventLog, LogData, TokenStandard};
use crate::domain::reduce::{reject_lazy, DomainEvent, Entity, EntityEvent, EventBody, ReducerTable, Watermarks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TokenStatus {
    /// Only ownership changes seen so far
    #[default]
    None,
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEventBody {
    Create {
        owner: Address,
        name: String,
        symbol: String,
        standard: TokenStandard,
    },
    ChangeOwnership {
        owner: Address,
    },
}

impl EventBody for TokenEventBody {
    fn is_lazy(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        match self {
            TokenEventBody::Create { .. } => "TokenCreate",
            TokenEventBody::ChangeOwnership { .. } => "TokenChangeOwnership",
        }
    }
}

pub type TokenEvent = DomainEvent<Address, TokenEventBody>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: Address,
    pub owner: Option<Address>,
    pub name: String,
    pub symbol: Option<String>,
    pub standard: Option<TokenStandard>,
    pub status: TokenStatus,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub watermarks: Watermarks,
    pub version: Option<u64>,
}

impl Entity for Token {
    type Id = Address;
    type Body = TokenEventBody;

    const KIND: EntityKind = EntityKind::Token;

    fn empty(id: Address) -> Self {
        Self {
            id,
            owner: None,
            name: String::new(),
            symbol: None,
            standard: None,
            status: TokenStatus::None,
            last_updated_at: None,
            watermarks: Watermarks::default(),
            version: None,
        }
    }

    fn id(&self) -> &Address {
        &self.id
    }

    fn version(&self) -> Option<u64> {
        self.version
    }

    fn set_version(&mut self, version: Option<u64>) {
        self.version = version;
    }

    fn watermarks(&self) -> &Watermarks {
        &self.watermarks
    }

    fn watermarks_mut(&mut self) -> &mut Watermarks {
        &mut self.watermarks
    }

    fn is_deleted(&self) -> bool {
        false
    }

    fn reducers() -> ReducerTable<Self> {
        ReducerTable {
            lazy: reject_lazy::<Token>,
            pending: reduce_pending,
            forward: reduce_forward,
        }
    }
}

fn apply_create(token: &mut Token, body: &TokenEventBody) {
    if let TokenEventBody::Create {
        owner,
        name,
        symbol,
        standard,
    } = body
    {
        token.owner = Some(*owner);
        token.name = name.clone();
        token.symbol = Some(symbol.clone());
        token.standard = Some(*standard);
    }
}

fn reduce_pending(mut token: Token, event: &EntityEvent<Token>) -> Result<Token, ReduceError> {
    match &event.body {
        TokenEventBody::Create { .. } => {
            if token.status == TokenStatus::None {
                apply_create(&mut token, &event.body);
                token.status = TokenStatus::Pending;
            }
        }
        TokenEventBody::ChangeOwnership { .. } => return Ok(token),
    }
    token.last_updated_at = Some(event.timestamp());
    Ok(token)
}

fn reduce_forward(mut token: Token, event: &EntityEvent<Token>) -> Result<Token, ReduceError> {
    match &event.body {
        TokenEventBody::Create { .. } => {
            apply_create(&mut token, &event.body);
            token.status = TokenStatus::Confirmed;
        }
        TokenEventBody::ChangeOwnership { owner } => {
            token.owner = Some(*owner);
        }
    }
    token.last_updated_at = Some(event.timestamp());
    Ok(token)
}

/// Maps collection logs to token events
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEventConverter;

impl EventConverter<Token> for TokenEventConverter {
    fn convert(&self, log: &EventLog) -> Result<Vec<TokenEvent>, DecodeError> {
        let events = match &log.data {
            LogData::CollectionCreated {
                token,
                owner,
                name,
                symbol,
                standard,
            } => vec![TokenEvent::new(
                *token,
                log.meta.clone(),
                TokenEventBody::Create {
                    owner: *owner,
                    name: name.clone(),
                    symbol: symbol.clone(),
                    standard: *standard,
                },
            )],
            LogData::CollectionOwnershipTransferred { token, new_owner, .. } => vec![TokenEvent::new(
                *token,
                log.meta.clone(),
                TokenEventBody::ChangeOwnership { owner: *new_owner },
            )],
            _ => Vec::new(),
        };
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use crate::domain::reduce::Stage;
    use chainfold_types::LogMeta;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn create(meta: LogMeta) -> TokenEvent {
        TokenEvent::new(
            Address::repeat_byte(7),
            meta,
            TokenEventBody::Create {
                owner: Address::repeat_byte(1),
                name: "Test".to_string(),
                symbol: "TST".to_string(),
                standard: TokenStandard::Erc721,
            },
        )
    }

    #[test]
    fn test_pending_create_then_confirmed() {
        let id = Address::repeat_byte(7);
        let pending = create(LogMeta::pending(id, B256::repeat_byte(1), 0, at(1)));
        let token = reduce_pending(Token::empty(id), &pending).unwrap();
        assert_eq!(token.status, TokenStatus::Pending);
        assert_eq!(token.standard, Some(TokenStandard::Erc721));

        let confirmed = create(LogMeta::confirmed(id, B256::repeat_byte(1), B256::repeat_byte(2), (3, 0, 0), at(2)));
        let token = reduce_forward(token, &confirmed).unwrap();
        assert_eq!(token.status, TokenStatus::Confirmed);
    }

    #[test]
    fn test_ownership_change_updates_owner() {
        let id = Address::repeat_byte(7);
        let change = TokenEvent::new(
            id,
            LogMeta::confirmed(id, B256::repeat_byte(1), B256::repeat_byte(2), (3, 0, 0), at(2)),
            TokenEventBody::ChangeOwnership {
                owner: Address::repeat_byte(9),
            },
        );
        let token = reduce_forward(Token::empty(id), &change).unwrap();
        assert_eq!(token.owner, Some(Address::repeat_byte(9)));
        assert_eq!(token.status, TokenStatus::None);
    }

    #[test]
    fn test_token_has_no_lazy_stage() {
        let id = Address::repeat_byte(7);
        let event = create(LogMeta::pending(id, B256::ZERO, 0, at(1)));
        assert!(matches!(
            Token::reducers().reduce(Stage::Lazy, Token::empty(id), &event),
            Err(ReduceError::InvalidEventForReducer { .. })
        ));
    }
}
