use std::time::Duration;

use async_trait::async_trait;
use engine::{
    BudgetQuery, BudgetedAmount, CommitmentFact, CommitmentLookup, CommitmentQuery, ExternalError,
    ExternalLedger,
};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    error::{Result, SofError},
    retry::{RetryPolicy, with_retry},
    wire::{BudgetRow, CommitmentRequest, CommitmentRow, Envelope},
};

pub const DEFAULT_BASE_URL: &str = "http://smae_orcamento:80/";

const NOTE_ENDPOINT: &str = "v1/empenhos/nota_empenho";
const PROCESS_ENDPOINT: &str = "v1/empenhos/processo";
const LINE_ENDPOINT: &str = "v1/empenhos/dotacao";
const BUDGET_ENDPOINT: &str = "v1/orcado/orcado_projeto";

/// HTTP client of the external financial system.
#[derive(Debug, Clone)]
pub struct SofClient {
    base_url: Url,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl SofClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        // `Url::join` drops the last segment unless the base ends with '/'.
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url =
            Url::parse(&base_url).map_err(|err| SofError::InvalidUrl(format!("{base_url}: {err}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        debug!(%base_url, "external ledger client configured");
        Ok(Self {
            base_url,
            http,
            retry,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| SofError::InvalidUrl(format!("{path}: {err}")))
    }

    /// Commitment rows for a note, a process or a budget line.
    pub async fn commitments(&self, query: &CommitmentQuery) -> Result<Vec<CommitmentFact>> {
        let (path, body) = match &query.lookup {
            CommitmentLookup::Note(note) => (
                NOTE_ENDPOINT,
                CommitmentRequest {
                    ano: query.year,
                    mes: query.month,
                    nota_empenho: Some(note),
                    processo: None,
                    dotacao: None,
                },
            ),
            CommitmentLookup::Process(process) => (
                PROCESS_ENDPOINT,
                CommitmentRequest {
                    ano: query.year,
                    mes: query.month,
                    nota_empenho: None,
                    processo: Some(process),
                    dotacao: None,
                },
            ),
            CommitmentLookup::Line(line_code) => (
                LINE_ENDPOINT,
                CommitmentRequest {
                    ano: query.year,
                    mes: query.month,
                    nota_empenho: None,
                    processo: None,
                    dotacao: Some(line_code),
                },
            ),
        };
        let url = self.endpoint(path)?;
        debug!(endpoint = path, ?body, "calling external ledger");

        let rows: Vec<CommitmentRow> = with_retry(self.retry, path, || async {
            let res = self.http.post(url.clone()).json(&body).send().await?;
            decode(res).await
        })
        .await?;

        let facts = rows
            .into_iter()
            .map(CommitmentFact::try_from)
            .collect::<Result<Vec<_>>>()?;
        debug!(endpoint = path, rows = facts.len(), "external ledger answered");
        Ok(facts)
    }

    /// Budgeted figures for a project/activity. A `"*"` unit is left out of
    /// the query so the whole agency is covered.
    pub async fn budgeted_amount(&self, query: &BudgetQuery) -> Result<Vec<BudgetedAmount>> {
        let mut url = self.endpoint(BUDGET_ENDPOINT)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("ano", &query.year.to_string())
                .append_pair("mes", &query.month.to_string())
                .append_pair("orgao", &query.agency);
            if query.unit != "*" {
                pairs.append_pair("unidade", &query.unit);
            }
            pairs
                .append_pair("proj_atividade", &query.project_activity)
                .append_pair("fonte", &query.funding_source);
        }
        debug!(%url, "calling external ledger");

        let rows: Vec<BudgetRow> = with_retry(self.retry, BUDGET_ENDPOINT, || async {
            let res = self.http.get(url.clone()).send().await?;
            decode(res).await
        })
        .await?;

        rows.into_iter().map(BudgetedAmount::try_from).collect()
    }
}

/// Turns a response into the rows of a successful envelope.
async fn decode<T: DeserializeOwned>(res: Response) -> Result<Vec<T>> {
    let status = res.status();
    let body = res.text().await?;
    if !status.is_success() {
        debug!(status = status.as_u16(), %body, "external ledger refused the request");
        return Err(SofError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let envelope: Envelope<T> =
        serde_json::from_str(&body).map_err(|err| SofError::Decode(format!("{err}: {body}")))?;
    envelope.into_data()
}

#[async_trait]
impl ExternalLedger for SofClient {
    async fn fetch_commitments(
        &self,
        query: &CommitmentQuery,
    ) -> std::result::Result<Vec<CommitmentFact>, ExternalError> {
        self.commitments(query).await.map_err(ExternalError::from)
    }

    async fn fetch_budgeted_amount(
        &self,
        query: &BudgetQuery,
    ) -> std::result::Result<Vec<BudgetedAmount>, ExternalError> {
        self.budgeted_amount(query).await.map_err(ExternalError::from)
    }
}

#[cfg(test)]
mod tests {
    use engine::Money;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path, query_param},
    };

    use super::*;

    fn client(server: &MockServer, limit: usize) -> SofClient {
        SofClient::new(
            &server.uri(),
            Duration::from_secs(5),
            RetryPolicy {
                limit,
                backoff: Duration::from_millis(1),
            },
        )
        .unwrap()
    }

    fn note_query() -> CommitmentQuery {
        CommitmentQuery {
            lookup: CommitmentLookup::Note("123456/2024".to_string()),
            year: 2024,
            month: 12,
        }
    }

    const NOTE_ANSWER: &str = r#"{
        "metadados": {"sucess": true, "message": "ok"},
        "data": [{
            "dotacao": "16.10.12.306.3016.2.873.33903900.00",
            "processo": "6016201900001234",
            "empenho_liquido": "1500.5",
            "val_liquidado": 600.25
        }]
    }"#;

    #[tokio::test]
    async fn note_inquiry_posts_the_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/nota_empenho"))
            .and(body_json(serde_json::json!({
                "ano": 2024, "mes": 12, "nota_empenho": "123456/2024"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(NOTE_ANSWER))
            .expect(1)
            .mount(&server)
            .await;

        let facts = client(&server, 0).commitments(&note_query()).await.unwrap();
        assert_eq!(
            facts,
            vec![CommitmentFact {
                line_code: "16.10.12.306.3016.2.873.33903900.00".to_string(),
                process_id: "6016201900001234".to_string(),
                committed_value: Money::new(1500_50),
                paid_value: Money::new(600_25),
            }]
        );
    }

    #[tokio::test]
    async fn process_and_line_inquiries_use_their_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/processo"))
            .and(body_json(serde_json::json!({
                "ano": 2023, "mes": 12, "processo": "6016201900001234"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(NOTE_ANSWER))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/dotacao"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"metadados": {"sucess": true, "message": ""}, "data": []}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, 0);
        let by_process = client
            .commitments(&CommitmentQuery {
                lookup: CommitmentLookup::Process("6016201900001234".to_string()),
                year: 2023,
                month: 12,
            })
            .await
            .unwrap();
        assert_eq!(by_process.len(), 1);

        let by_line = client
            .commitments(&CommitmentQuery {
                lookup: CommitmentLookup::Line("16.10".to_string()),
                year: 2023,
                month: 12,
            })
            .await
            .unwrap();
        assert!(by_line.is_empty());
    }

    #[tokio::test]
    async fn transient_status_is_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/nota_empenho"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/nota_empenho"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NOTE_ANSWER))
            .expect(1)
            .mount(&server)
            .await;

        let facts = client(&server, 2).commitments(&note_query()).await.unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn retries_stop_at_the_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/nota_empenho"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 2)
            .fetch_commitments(&note_query())
            .await
            .unwrap_err();
        let ExternalError::Unavailable { status, detail } = err;
        assert_eq!(status, Some(502));
        assert!(detail.contains("bad gateway"));
    }

    #[tokio::test]
    async fn other_statuses_fail_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/nota_empenho"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string(r#"{"detail": "mes invalido"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3).commitments(&note_query()).await.unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/empenhos/nota_empenho"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"metadados": {"sucess": false, "message": "erro interno"}, "data": []}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3)
            .fetch_commitments(&note_query())
            .await
            .unwrap_err();
        let ExternalError::Unavailable { status, detail } = err;
        assert_eq!(status, None);
        assert!(detail.contains("erro interno"));
    }

    #[tokio::test]
    async fn budget_inquiry_skips_the_wildcard_unit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/orcado/orcado_projeto"))
            .and(query_param("ano", "2024"))
            .and(query_param("mes", "6"))
            .and(query_param("orgao", "16"))
            .and(query_param("proj_atividade", "3016"))
            .and(query_param("fonte", "00"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "metadados": {"sucess": true, "message": ""},
                    "data": [{
                        "val_orcado_inicial": 1000,
                        "val_orcado_atualizado": "1200.10",
                        "saldo_disponivel": 350.999
                    }]
                }"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let amounts = client(&server, 0)
            .budgeted_amount(&BudgetQuery {
                year: 2024,
                month: 6,
                agency: "16".to_string(),
                unit: "*".to_string(),
                project_activity: "3016".to_string(),
                funding_source: "00".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            amounts,
            vec![BudgetedAmount {
                initial_value: Money::new(1000_00),
                current_value: Money::new(1200_10),
                available_balance: Money::new(351_00),
            }]
        );

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].url.query().unwrap_or_default().contains("unidade"));
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_its_path() {
        let client = SofClient::new(
            "http://ledger.local/api",
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(NOTE_ENDPOINT).unwrap().as_str(),
            "http://ledger.local/api/v1/empenhos/nota_empenho"
        );
    }
}
