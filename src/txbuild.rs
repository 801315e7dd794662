//! Shared V0-message compilation helper used by both the single-transaction
//! path and the Bundle Builder's two-transaction split (§4.3 "Compile the
//! transaction message using V0 format with the loaded ALTs").

use crate::types::CompiledInstruction;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, AddressLookupTableAccount, VersionedMessage},
    pubkey::Pubkey,
    signature::Keypair,
    transaction::VersionedTransaction,
};

pub fn to_sdk_instructions(instructions: &[CompiledInstruction]) -> Vec<Instruction> {
    instructions.iter().cloned().map(CompiledInstruction::into_instruction).collect()
}

/// Compile a V0 message referencing `alts` and sign it with `signer`.
pub fn compile_and_sign(
    payer: Pubkey,
    instructions: &[Instruction],
    alts: &[AddressLookupTableAccount],
    blockhash: Hash,
    signer: &Keypair,
) -> anyhow::Result<VersionedTransaction> {
    let message = v0::Message::try_compile(&payer, instructions, alts, blockhash)?;
    let versioned_message = VersionedMessage::V0(message);
    let tx = VersionedTransaction::try_new(versioned_message, &[signer])?;
    Ok(tx)
}

pub fn serialized_len(tx: &VersionedTransaction) -> anyhow::Result<usize> {
    Ok(bincode::serialize(tx)?.len())
}
