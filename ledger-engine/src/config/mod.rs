//! Configuration module for ledger-engine.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` runs the engine on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub engine: EngineConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// What happens when a payment is recorded against a draft invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DraftPaymentPolicy {
    /// Move the invoice to `sent` (issue date = payment date) before settling.
    #[default]
    Promote,
    /// Refuse with `InvalidInvoiceStatus`.
    Reject,
}

impl FromStr for DraftPaymentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "promote" => Ok(DraftPaymentPolicy::Promote),
            "reject" => Ok(DraftPaymentPolicy::Reject),
            other => Err(format!("unknown draft payment policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub number_pad_width: usize,
    pub quote_number_prefix: String,
    pub invoice_number_prefix: String,
    pub default_payment_terms_days: i32,
    pub draft_payment_policy: DraftPaymentPolicy,
    pub default_currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            number_pad_width: 5,
            quote_number_prefix: "Q-".to_string(),
            invoice_number_prefix: "INV-".to_string(),
            default_payment_terms_days: 30,
            draft_payment_policy: DraftPaymentPolicy::Promote,
            default_currency: "EUR".to_string(),
        }
    }
}

/// Chart of accounts and journal codes used by the ledger export.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub export_tag: String,
    pub sales_journal: String,
    pub bank_journal: String,
    pub receivable_account: String,
    pub revenue_account: String,
    pub vat_account: String,
    pub bank_account: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_tag: "FEC".to_string(),
            sales_journal: "VT".to_string(),
            bank_journal: "BQ".to_string(),
            receivable_account: "411000".to_string(),
            revenue_account: "706000".to_string(),
            vat_account: "445710".to_string(),
            bank_account: "512000".to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}'", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let draft_payment_policy = match env::var("DRAFT_PAYMENT_POLICY") {
            Ok(raw) => raw
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            Err(_) => defaults.draft_payment_policy,
        };

        Ok(Self {
            number_pad_width: parse_env("NUMBER_PAD_WIDTH", defaults.number_pad_width)?,
            quote_number_prefix: env_or("QUOTE_NUMBER_PREFIX", &defaults.quote_number_prefix),
            invoice_number_prefix: env_or(
                "INVOICE_NUMBER_PREFIX",
                &defaults.invoice_number_prefix,
            ),
            default_payment_terms_days: parse_env(
                "DEFAULT_PAYMENT_TERMS_DAYS",
                defaults.default_payment_terms_days,
            )?,
            draft_payment_policy,
            default_currency: env_or("DEFAULT_CURRENCY", &defaults.default_currency),
        })
    }
}

impl ExportConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            export_tag: env_or("EXPORT_TAG", &defaults.export_tag),
            sales_journal: env_or("EXPORT_SALES_JOURNAL", &defaults.sales_journal),
            bank_journal: env_or("EXPORT_BANK_JOURNAL", &defaults.bank_journal),
            receivable_account: env_or("EXPORT_RECEIVABLE_ACCOUNT", &defaults.receivable_account),
            revenue_account: env_or("EXPORT_REVENUE_ACCOUNT", &defaults.revenue_account),
            vat_account: env_or("EXPORT_VAT_ACCOUNT", &defaults.vat_account),
            bank_account: env_or("EXPORT_BANK_ACCOUNT", &defaults.bank_account),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2)?,
            }),
            _ => None,
        };

        Ok(Self {
            common,
            service_name: env_or("SERVICE_NAME", "ledger-engine"),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env_or("LOG_LEVEL", "info"),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database,
            engine: EngineConfig::from_env()?,
            export: ExportConfig::from_env(),
        })
    }

    /// In-memory configuration bound to an ephemeral port, for tests and local runs.
    pub fn in_memory() -> Self {
        Self {
            common: core_config::Config {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            service_name: "ledger-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: None,
            engine: EngineConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_draft_payment_policy() {
        assert_eq!(
            "promote".parse::<DraftPaymentPolicy>(),
            Ok(DraftPaymentPolicy::Promote)
        );
        assert_eq!(
            " Reject ".parse::<DraftPaymentPolicy>(),
            Ok(DraftPaymentPolicy::Reject)
        );
        assert!("ignore".parse::<DraftPaymentPolicy>().is_err());
    }

    #[test]
    fn defaults_match_the_numbering_convention() {
        let engine = EngineConfig::default();
        assert_eq!(engine.number_pad_width, 5);
        assert_eq!(engine.invoice_number_prefix, "INV-");
        assert_eq!(engine.default_payment_terms_days, 30);
    }
}
