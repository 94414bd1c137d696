//! ABI decoding of raw listener logs into typed event logs

use alloy_primitives::{Address, Log, U256};
use alloy_sol_types::{sol, SolEvent};

use super::log::{EventLog, LogData, RawLog, TokenStandard};
use crate::core::DecodeError;

sol! {
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    interface IERC721 {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }

    interface IERC1155 {
        event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
        event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values);
    }

    interface IOwnable {
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
    }

    interface IRaribleCollection {
        event CreateERC721_v4(address owner, string name, string symbol);
        event CreateERC1155_v1(address owner, string name, string symbol);
    }

    interface IWETH {
        event Deposit(address indexed dst, uint256 wad);
        event Withdrawal(address indexed src, uint256 wad);
    }

    interface IExchangeV2 {
        event Match(bytes32 leftHash, bytes32 rightHash, uint256 newLeftFill, uint256 newRightFill);
        event Cancel(bytes32 hash);
    }
}

fn decode<E: SolEvent>(log: &Log) -> Result<E, DecodeError> {
    E::decode_log(log)
        .map(|decoded| decoded.data)
        .map_err(|e| DecodeError::AbiMismatch {
            event: E::SIGNATURE.to_string(),
            reason: e.to_string(),
        })
}

/// Decode one raw log.
///
/// Unknown topics yield an empty list. ERC1155 batch transfers expand into
/// one log per token id, distinguished by minor log index.
pub fn decode_raw_log(raw: &RawLog) -> Result<Vec<EventLog>, DecodeError> {
    let topic0 = *raw.topics.first().ok_or(DecodeError::MissingTopics)?;
    let meta = raw.meta()?;
    let log = Log::new_unchecked(raw.address, raw.topics.clone(), raw.data.clone());
    let token = raw.address;

    let single = |data: LogData| -> Result<Vec<EventLog>, DecodeError> {
        Ok(vec![EventLog::new(meta.clone(), data)])
    };

    if topic0 == IERC721::Transfer::SIGNATURE_HASH && raw.topics.len() == 4 {
        let ev = decode::<IERC721::Transfer>(&log)?;
        return single(LogData::NftTransfer {
            token,
            token_id: ev.tokenId,
            from: ev.from,
            to: ev.to,
            value: U256::from(1),
        });
    }

    if topic0 == IERC20::Transfer::SIGNATURE_HASH {
        let ev = decode::<IERC20::Transfer>(&log)?;
        return single(LogData::Erc20Transfer {
            token,
            from: ev.from,
            to: ev.to,
            value: ev.value,
        });
    }

    if topic0 == IERC1155::TransferSingle::SIGNATURE_HASH {
        let ev = decode::<IERC1155::TransferSingle>(&log)?;
        return single(LogData::NftTransfer {
            token,
            token_id: ev.id,
            from: ev.from,
            to: ev.to,
            value: ev.value,
        });
    }

    if topic0 == IERC1155::TransferBatch::SIGNATURE_HASH {
        let ev = decode::<IERC1155::TransferBatch>(&log)?;
        if ev.ids.len() != ev.values.len() {
            return Err(DecodeError::AbiMismatch {
                event: IERC1155::TransferBatch::SIGNATURE.to_string(),
                reason: format!("{} ids but {} values", ev.ids.len(), ev.values.len()),
            });
        }
        return Ok(ev
            .ids
            .iter()
            .zip(ev.values.iter())
            .enumerate()
            .map(|(i, (id, value))| {
                EventLog::new(
                    meta.clone().with_minor_index(i as u32),
                    LogData::NftTransfer {
                        token,
                        token_id: *id,
                        from: ev.from,
                        to: ev.to,
                        value: *value,
                    },
                )
            })
            .collect());
    }

    if topic0 == IOwnable::OwnershipTransferred::SIGNATURE_HASH {
        let ev = decode::<IOwnable::OwnershipTransferred>(&log)?;
        return single(LogData::CollectionOwnershipTransferred {
            token,
            previous_owner: ev.previousOwner,
            new_owner: ev.newOwner,
        });
    }

    if topic0 == IRaribleCollection::CreateERC721_v4::SIGNATURE_HASH {
        let ev = decode::<IRaribleCollection::CreateERC721_v4>(&log)?;
        return single(collection_created(token, ev.owner, ev.name, ev.symbol, TokenStandard::Erc721));
    }

    if topic0 == IRaribleCollection::CreateERC1155_v1::SIGNATURE_HASH {
        let ev = decode::<IRaribleCollection::CreateERC1155_v1>(&log)?;
        return single(collection_created(token, ev.owner, ev.name, ev.symbol, TokenStandard::Erc1155));
    }

    if topic0 == IWETH::Deposit::SIGNATURE_HASH {
        let ev = decode::<IWETH::Deposit>(&log)?;
        return single(LogData::Erc20Deposit {
            token,
            owner: ev.dst,
            value: ev.wad,
        });
    }

    if topic0 == IWETH::Withdrawal::SIGNATURE_HASH {
        let ev = decode::<IWETH::Withdrawal>(&log)?;
        return single(LogData::Erc20Withdrawal {
            token,
            owner: ev.src,
            value: ev.wad,
        });
    }

    if topic0 == IExchangeV2::Match::SIGNATURE_HASH {
        let ev = decode::<IExchangeV2::Match>(&log)?;
        return single(LogData::OrderMatch {
            exchange: token,
            left_hash: ev.leftHash,
            right_hash: ev.rightHash,
            left_fill: ev.newLeftFill,
            right_fill: ev.newRightFill,
        });
    }

    if topic0 == IExchangeV2::Cancel::SIGNATURE_HASH {
        let ev = decode::<IExchangeV2::Cancel>(&log)?;
        return single(LogData::OrderCancel {
            exchange: token,
            hash: ev.hash,
        });
    }

    Ok(Vec::new())
}

fn collection_created(
    token: Address,
    owner: Address,
    name: String,
    symbol: String,
    standard: TokenStandard,
) -> LogData {
    LogData::CollectionCreated {
        token,
        owner,
        name,
        symbol,
        standard,
    }
}
