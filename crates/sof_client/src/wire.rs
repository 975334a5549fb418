//! JSON shapes of the external financial system.
//!
//! Amounts arrive as JSON numbers on some endpoints and as text on others;
//! [`Amount`] accepts both and converts through decimal text so no float
//! rounding reaches the cents.

use engine::{BudgetedAmount, CommitmentFact, Money};
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::error::{Result, SofError};

#[derive(Debug, Deserialize)]
pub(crate) struct Metadata {
    #[serde(default)]
    pub sucess: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub metadados: Option<Metadata>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Envelope<T> {
    /// Rows of a successful answer; anything else is an error.
    pub fn into_data(self) -> Result<Vec<T>> {
        match self.metadados {
            Some(meta) if meta.sucess => Ok(self.data),
            Some(meta) => Err(SofError::Unsuccessful(meta.message)),
            None => Err(SofError::Decode("missing metadados".to_string())),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Amount {
    Number(Number),
    Text(String),
}

impl Amount {
    pub fn to_money(&self, field: &str) -> Result<Money> {
        let raw = match self {
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text.clone(),
        };
        Money::from_external_str(&raw).map_err(|err| SofError::Decode(format!("{field}: {err}")))
    }
}

/// Process numbers are sometimes sent as JSON numbers.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Identifier {
    Number(Number),
    Text(String),
}

impl Identifier {
    fn into_text(self) -> String {
        match self {
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitmentRow {
    pub dotacao: String,
    pub processo: Identifier,
    pub empenho_liquido: Amount,
    pub val_liquidado: Amount,
}

impl TryFrom<CommitmentRow> for CommitmentFact {
    type Error = SofError;

    fn try_from(row: CommitmentRow) -> Result<Self> {
        Ok(CommitmentFact {
            line_code: row.dotacao.trim().to_string(),
            committed_value: row.empenho_liquido.to_money("empenho_liquido")?,
            paid_value: row.val_liquidado.to_money("val_liquidado")?,
            process_id: row.processo.into_text(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BudgetRow {
    pub val_orcado_inicial: Amount,
    pub val_orcado_atualizado: Amount,
    pub saldo_disponivel: Amount,
}

impl TryFrom<BudgetRow> for BudgetedAmount {
    type Error = SofError;

    fn try_from(row: BudgetRow) -> Result<Self> {
        Ok(BudgetedAmount {
            initial_value: row.val_orcado_inicial.to_money("val_orcado_inicial")?,
            current_value: row.val_orcado_atualizado.to_money("val_orcado_atualizado")?,
            available_balance: row.saldo_disponivel.to_money("saldo_disponivel")?,
        })
    }
}

/// Body of the commitment inquiries. Exactly one key is set.
#[derive(Debug, Serialize)]
pub(crate) struct CommitmentRequest<'a> {
    pub ano: i32,
    pub mes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nota_empenho: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processo: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dotacao: Option<&'a str>,
}
