//! System and SPL token instructions: construction and recognition
//!
//! Only the handful of instructions a wallet transfer needs are built here;
//! everything else in a transaction is reported as [`ParsedInstruction::Unknown`].

use solana_sdk::instruction::{AccountMeta, CompiledInstruction, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::pubkey;

pub const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");
pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

const SYSTEM_TRANSFER: u32 = 2;
const TOKEN_TRANSFER: u8 = 3;
const TOKEN_TRANSFER_CHECKED: u8 = 12;
const ATA_CREATE_IDEMPOTENT: u8 = 1;

/// Associated token account of `owner` for `mint`
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

pub fn system_transfer_data(lamports: u64) -> Vec<u8> {
    let mut data = SYSTEM_TRANSFER.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());
    data
}

pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data: system_transfer_data(lamports),
    }
}

/// `CreateIdempotent`: succeeds when the account already exists
pub fn create_associated_token_account(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(associated_token_address(owner, mint), false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT],
    }
}

pub fn transfer_checked(
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Instruction {
    let mut data = vec![TOKEN_TRANSFER_CHECKED];
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);

    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInstruction {
    SystemTransfer {
        from: Pubkey,
        to: Pubkey,
        lamports: u64,
    },
    /// `Transfer` or `TransferChecked`; only the latter names the mint
    TokenTransfer {
        source: Pubkey,
        destination: Pubkey,
        authority: Pubkey,
        mint: Option<Pubkey>,
        amount: u64,
    },
    CreateAssociatedAccount {
        payer: Pubkey,
        account: Pubkey,
        owner: Pubkey,
        mint: Pubkey,
    },
    Unknown,
}

fn read_u64(data: &[u8]) -> Option<u64> {
    Some(u64::from_le_bytes(data.get(..8)?.try_into().ok()?))
}

/// Recognize a compiled instruction against the message's static account keys
pub fn parse_instruction(account_keys: &[Pubkey], ix: &CompiledInstruction) -> ParsedInstruction {
    parse(account_keys, ix).unwrap_or(ParsedInstruction::Unknown)
}

fn parse(keys: &[Pubkey], ix: &CompiledInstruction) -> Option<ParsedInstruction> {
    let program = keys.get(ix.program_id_index as usize)?;
    let account = |position: usize| -> Option<Pubkey> {
        keys.get(*ix.accounts.get(position)? as usize).copied()
    };
    let data = ix.data.as_slice();

    if *program == SYSTEM_PROGRAM_ID {
        let tag = u32::from_le_bytes(data.get(..4)?.try_into().ok()?);
        if tag != SYSTEM_TRANSFER || data.len() != 12 {
            return None;
        }
        return Some(ParsedInstruction::SystemTransfer {
            from: account(0)?,
            to: account(1)?,
            lamports: read_u64(&data[4..])?,
        });
    }

    if *program == TOKEN_PROGRAM_ID {
        return match *data.first()? {
            TOKEN_TRANSFER if data.len() == 9 => Some(ParsedInstruction::TokenTransfer {
                source: account(0)?,
                destination: account(1)?,
                authority: account(2)?,
                mint: None,
                amount: read_u64(&data[1..])?,
            }),
            TOKEN_TRANSFER_CHECKED if data.len() == 10 => Some(ParsedInstruction::TokenTransfer {
                source: account(0)?,
                mint: Some(account(1)?),
                destination: account(2)?,
                authority: account(3)?,
                amount: read_u64(&data[1..])?,
            }),
            _ => None,
        };
    }

    // Create (empty data or 0) and CreateIdempotent (1)
    let create = data.len() <= 1 && data.first().copied().unwrap_or(0) <= 1;
    if *program == ASSOCIATED_TOKEN_PROGRAM_ID && create {
        return Some(ParsedInstruction::CreateAssociatedAccount {
            payer: account(0)?,
            account: account(1)?,
            owner: account(2)?,
            mint: account(3)?,
        });
    }

    None
}
