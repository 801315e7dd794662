//! Aggregator HTTP client (§6).
//!
//! Built directly on `reqwest` + `serde`, in the retry/client-construction
//! style of `rust-modules/src/dex_clients/mod.rs`, rather than on a pinned
//! third-party SDK — the spec needs bit-exact control over the
//! `/swap-instructions` response shape (raw `programId`/`accounts`/`data`
//! triples) and tolerance for the `routePlan`-vs-flat-fields open question
//! (`SPEC_FULL.md` §9), which a high-level SDK's own types would work
//! against rather than for.

use crate::error::AggregatorError;
use crate::types::{AccountRef, Asset, CompiledInstruction, Quote, RouteStep};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AggregatorClient {
    base_url: String,
    http: reqwest::Client,
    max_retries: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct QuoteParams {
    pub slippage_bps: u16,
    pub only_direct_routes: bool,
    pub max_accounts: u8,
    pub restrict_intermediate_tokens: bool,
}

impl AggregatorClient {
    pub fn new(base_url: String, max_retries: u8, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build aggregator http client");
        Self {
            base_url,
            http,
            max_retries,
        }
    }

    /// `GET /quote`, retried up to `max_retries` times with exponential
    /// backoff; a `dexes` constraint (if any) is dropped on retry per §6.
    pub async fn quote(
        &self,
        input: Asset,
        output: Asset,
        amount: u64,
        params: QuoteParams,
        dexes: Option<&[String]>,
    ) -> Result<Quote, AggregatorError> {
        let max_retries = self.max_retries.max(1);
        let attempt = std::cell::Cell::new(0u8);
        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_secs(3))
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();

        backoff::future::retry(policy, || async {
            let n = attempt.get() + 1;
            attempt.set(n);
            // the `dexes` constraint is dropped after the first attempt (§6)
            let attempt_dexes = if n == 1 { dexes } else { None };

            match self.fetch_quote(input, output, amount, params, attempt_dexes).await {
                Ok(quote) => Ok(quote),
                Err(e @ AggregatorError::NoRoute) => Err(backoff::Error::permanent(e)),
                Err(e) => {
                    warn!(attempt = n, error = %e, "aggregator quote attempt failed");
                    if n >= max_retries {
                        Err(backoff::Error::permanent(e))
                    } else {
                        Err(backoff::Error::transient(e))
                    }
                }
            }
        })
        .await
    }

    async fn fetch_quote(
        &self,
        input: Asset,
        output: Asset,
        amount: u64,
        params: QuoteParams,
        dexes: Option<&[String]>,
    ) -> Result<Quote, AggregatorError> {
        let mut req = self
            .http
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", input.mint.to_string()),
                ("outputMint", output.mint.to_string()),
                ("amount", amount.to_string()),
                ("slippageBps", params.slippage_bps.to_string()),
                ("onlyDirectRoutes", params.only_direct_routes.to_string()),
                ("maxAccounts", params.max_accounts.to_string()),
                (
                    "restrictIntermediateTokens",
                    params.restrict_intermediate_tokens.to_string(),
                ),
            ]);
        if let Some(dexes) = dexes {
            if !dexes.is_empty() {
                req = req.query(&[("dexes", dexes.join(","))]);
            }
        }

        let response = req.send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AggregatorError::NoRoute);
        }
        if status.is_server_error() {
            return Err(AggregatorError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            return Err(AggregatorError::Malformed(format!(
                "unexpected status {status}"
            )));
        }

        let parsed: QuoteResponse = response.json().await?;
        quote_response_to_quote(input, output, amount, parsed)
    }

    /// `POST /swap-instructions`.
    pub async fn swap_instructions(
        &self,
        quote: &QuoteResponse,
        user_public_key: Pubkey,
    ) -> Result<SwapInstructionsResponse, AggregatorError> {
        let body = serde_json::json!({
            "quoteResponse": quote,
            "userPublicKey": user_public_key.to_string(),
            "wrapAndUnwrapSol": false,
            "dynamicComputeUnitLimit": true,
            "asLegacyTransaction": false,
            "useSharedAccounts": true,
            "skipUserAccountsRpcCalls": true,
        });

        let response = self
            .http
            .post(format!("{}/swap-instructions", self.base_url))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::Malformed(format!(
                "swap-instructions returned status {status}"
            )));
        }
        let raw: RawSwapInstructionsResponse = response.json().await?;
        raw.try_into()
    }
}

// --- wire types -------------------------------------------------------

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct SwapInfo {
    #[serde(rename = "ammKey")]
    pub amm_key: String,
    pub label: String,
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "feeAmount", default)]
    pub fee_amount: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RoutePlanStep {
    #[serde(rename = "swapInfo")]
    pub swap_info: SwapInfo,
    pub percent: f64,
}

/// Tolerates both the `routePlan` shape and aggregators that omit it in
/// favor of flat top-level fields (open question #1, resolved in
/// `DESIGN.md`).
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct QuoteResponse {
    #[serde(rename = "inputMint", default)]
    pub input_mint: Option<String>,
    #[serde(rename = "outputMint", default)]
    pub output_mint: Option<String>,
    #[serde(rename = "inAmount", default)]
    pub in_amount: Option<String>,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "routePlan", default)]
    pub route_plan: Option<Vec<RoutePlanStep>>,
    #[serde(rename = "marketInfos", default)]
    pub market_infos: Option<serde_json::Value>,
}

fn quote_response_to_quote(
    input: Asset,
    output: Asset,
    input_amount: u64,
    resp: QuoteResponse,
) -> Result<Quote, AggregatorError> {
    let out_amount: u64 = resp
        .out_amount
        .parse()
        .map_err(|_| AggregatorError::Malformed("outAmount not a u64".to_string()))?;

    let route_plan = match &resp.route_plan {
        Some(steps) if !steps.is_empty() => steps
            .iter()
            .map(|step| {
                Ok(RouteStep {
                    dex_label: step.swap_info.label.clone(),
                    pool_id: step.swap_info.amm_key.clone(),
                    input_mint: Pubkey::from_str(&step.swap_info.input_mint)
                        .map_err(|_| AggregatorError::Malformed("bad input mint".to_string()))?,
                    output_mint: Pubkey::from_str(&step.swap_info.output_mint)
                        .map_err(|_| AggregatorError::Malformed("bad output mint".to_string()))?,
                    in_amount: step.swap_info.in_amount.parse().unwrap_or(0),
                    out_amount: step.swap_info.out_amount.parse().unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>, AggregatorError>>()?,
        // Flat-shape fallback: synthesize a single hop from the top-level
        // fields so downstream code always sees at least one RouteStep.
        _ => vec![RouteStep {
            dex_label: "unknown".to_string(),
            pool_id: "unknown".to_string(),
            input_mint: input.mint,
            output_mint: output.mint,
            in_amount: input_amount,
            out_amount,
        }],
    };

    Ok(Quote {
        input_asset: input,
        output_asset: output,
        input_amount,
        output_amount: out_amount,
        route_plan,
        acquired_at: Instant::now(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAccountMeta {
    pub pubkey: String,
    #[serde(rename = "isSigner")]
    pub is_signer: bool,
    #[serde(rename = "isWritable")]
    pub is_writable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireInstruction {
    #[serde(rename = "programId")]
    pub program_id: String,
    pub accounts: Vec<WireAccountMeta>,
    pub data: String,
}

impl TryFrom<WireInstruction> for CompiledInstruction {
    type Error = AggregatorError;

    fn try_from(wire: WireInstruction) -> Result<Self, Self::Error> {
        let program_id = Pubkey::from_str(&wire.program_id)
            .map_err(|_| AggregatorError::Malformed("bad programId".to_string()))?;
        let account_refs = wire
            .accounts
            .into_iter()
            .map(|a| {
                Ok(AccountRef {
                    pubkey: Pubkey::from_str(&a.pubkey)
                        .map_err(|_| AggregatorError::Malformed("bad account pubkey".to_string()))?,
                    is_signer: a.is_signer,
                    is_writable: a.is_writable,
                })
            })
            .collect::<Result<Vec<_>, AggregatorError>>()?;
        // Bit-exact per the design notes: the data payload is decoded as-is,
        // never reinterpreted.
        let data_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &wire.data)
            .map_err(|_| AggregatorError::Malformed("bad instruction data base64".to_string()))?;
        Ok(CompiledInstruction {
            program_id,
            account_refs,
            data_bytes,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawSwapInstructionsResponse {
    #[serde(rename = "computeBudgetInstructions", default)]
    compute_budget_instructions: Vec<WireInstruction>,
    #[serde(rename = "setupInstructions", default)]
    setup_instructions: Vec<WireInstruction>,
    #[serde(rename = "swapInstruction")]
    swap_instruction: WireInstruction,
    #[serde(rename = "cleanupInstruction", default)]
    cleanup_instruction: Option<WireInstruction>,
    #[serde(rename = "addressLookupTableAddresses", default)]
    address_lookup_table_addresses: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SwapInstructionsResponse {
    pub compute_budget_instructions: Vec<CompiledInstruction>,
    pub setup_instructions: Vec<CompiledInstruction>,
    pub swap_instruction: CompiledInstruction,
    pub cleanup_instruction: Option<CompiledInstruction>,
    pub address_lookup_table_addresses: Vec<Pubkey>,
}

impl TryFrom<RawSwapInstructionsResponse> for SwapInstructionsResponse {
    type Error = AggregatorError;

    fn try_from(raw: RawSwapInstructionsResponse) -> Result<Self, Self::Error> {
        Ok(SwapInstructionsResponse {
            compute_budget_instructions: raw
                .compute_budget_instructions
                .into_iter()
                .map(CompiledInstruction::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            setup_instructions: raw
                .setup_instructions
                .into_iter()
                .map(CompiledInstruction::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            swap_instruction: raw.swap_instruction.try_into()?,
            cleanup_instruction: raw
                .cleanup_instruction
                .map(CompiledInstruction::try_from)
                .transpose()?,
            address_lookup_table_addresses: raw
                .address_lookup_table_addresses
                .into_iter()
                .map(|s| {
                    Pubkey::from_str(&s)
                        .map_err(|_| AggregatorError::Malformed("bad ALT address".to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_quote_response_synthesizes_single_route_step() {
        let input = Asset::new(Pubkey::new_unique(), 9);
        let output = Asset::new(Pubkey::new_unique(), 9);
        let resp = QuoteResponse {
            input_mint: Some(input.mint.to_string()),
            output_mint: Some(output.mint.to_string()),
            in_amount: Some("1000".to_string()),
            out_amount: "1050".to_string(),
            route_plan: None,
            market_infos: None,
        };
        let quote = quote_response_to_quote(input, output, 1000, resp).unwrap();
        assert_eq!(quote.route_plan.len(), 1);
        assert_eq!(quote.output_amount, 1050);
    }

    #[test]
    fn route_plan_shape_is_preferred_when_present() {
        let input = Asset::new(Pubkey::new_unique(), 9);
        let output = Asset::new(Pubkey::new_unique(), 9);
        let resp = QuoteResponse {
            input_mint: None,
            output_mint: None,
            in_amount: None,
            out_amount: "2000".to_string(),
            route_plan: Some(vec![RoutePlanStep {
                swap_info: SwapInfo {
                    amm_key: Pubkey::new_unique().to_string(),
                    label: "raydium".to_string(),
                    input_mint: input.mint.to_string(),
                    output_mint: output.mint.to_string(),
                    in_amount: "1000".to_string(),
                    out_amount: "2000".to_string(),
                    fee_amount: None,
                },
                percent: 100.0,
            }]),
            market_infos: None,
        };
        let quote = quote_response_to_quote(input, output, 1000, resp).unwrap();
        assert_eq!(quote.route_plan.len(), 1);
        assert_eq!(quote.route_plan[0].dex_label, "raydium");
    }
}
