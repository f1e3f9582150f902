use anyhow::{Result, anyhow};

use crate::metadata::resolve_symbol;
use crate::models::{Chain, Depth};
use crate::query::formatters::{OutputFormat, format_first_seen, format_receipt, format_transfers};
use crate::receipt::ReceiptService;
use crate::validation::{validate_address, validate_chain, validate_depth, validate_token};

/// Validated positional arguments shared by every subcommand.
#[derive(Debug)]
pub struct PositionQuery {
    pub chain: Chain,
    pub address: String,
    pub token: String,
    pub depth: Depth,
}

impl PositionQuery {
    pub fn parse(chain: &str, address: &str, token: &str, depth: &str) -> Result<Self> {
        let chain = validate_chain(chain).map_err(|e| anyhow!(e))?;
        validate_address(chain, address).map_err(|e| anyhow!(e))?;
        let token = match validate_token(chain, token) {
            Ok(()) => token,
            Err(e) => resolve_symbol(chain, token).ok_or_else(|| anyhow!(e))?,
        };
        let depth = validate_depth(depth).map_err(|e| anyhow!(e))?;
        Ok(Self {
            chain,
            address: address.to_string(),
            token: token.to_string(),
            depth,
        })
    }
}

pub async fn cmd_receipt(service: &ReceiptService, query: &PositionQuery, format: OutputFormat) -> Result<()> {
    let receipt = service
        .build(query.chain, &query.address, &query.token, query.depth)
        .await?;
    println!("{}", format_receipt(&receipt, format)?);

    Ok(())
}

pub async fn cmd_first_seen(service: &ReceiptService, query: &PositionQuery, format: OutputFormat) -> Result<()> {
    let result = service
        .scanners()
        .estimate_first_seen(query.chain.as_str(), &query.address, &query.token, query.depth)
        .await;
    println!("{}", format_first_seen(&result, format)?);

    Ok(())
}

pub async fn cmd_transfers(
    service: &ReceiptService,
    query: &PositionQuery,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let meta = service.metadata().resolve(query.chain, &query.token).await?;
    let transfers = service
        .scanners()
        .recent_transfers(query.chain.as_str(), &query.address, &query.token, meta.decimals, limit)
        .await;
    println!("{}", format_transfers(&transfers, format)?);

    Ok(())
}
