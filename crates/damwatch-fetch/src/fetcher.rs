//! Per-dam fetch with bounded retry.
//!
//! | Upstream answer | Outcome |
//! |-----------------|---------|
//! | `200` | screened readings, [`FetchOutcome::Fetched`] |
//! | `204`, `408` | retried; [`Error::TransientUpstream`] once the budget is spent |
//! | `422` | [`FetchOutcome::NotAvailable`], no retry |
//! | anything else | [`Error::TerminalUpstream`], no retry |
//! | transport failure | retried; [`Error::Transport`] once the budget is spent |

use damwatch_core::resource::{Screened, screen_latest_response};
use reqwest::StatusCode;
use tracing::{error, info, warn};

use crate::{Error, Result, client::ResourceApi, retry::RetryPolicy};

/// What a single dam's fetch produced.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  Fetched(Screened),
  /// The upstream rejected the dam id (or failed internally) for this dam.
  NotAvailable,
}

pub struct Fetcher<A> {
  api:    A,
  policy: RetryPolicy,
}

impl<A: ResourceApi> Fetcher<A> {
  pub fn new(api: A, policy: RetryPolicy) -> Self { Self { api, policy } }

  pub fn api(&self) -> &A { &self.api }

  /// Fetch the latest resources for `dam_id`.
  ///
  /// The only blocking in here is the sleep between attempts, bounded by
  /// the policy. Each attempt is itself bounded by the client timeout.
  pub async fn fetch(&self, dam_id: &str) -> Result<FetchOutcome> {
    let attempts = self.policy.attempts();
    let mut attempt = 0;

    loop {
      attempt += 1;

      let failure = match self.api.latest_resources(dam_id).await {
        Ok(resp) => match resp.status {
          StatusCode::OK => {
            let screened = screen_latest_response(&resp.body, dam_id).map_err(|source| {
              Error::Decode { dam_id: dam_id.to_owned(), source }
            })?;
            for rejected in &screened.rejected {
              warn!(
                dam_id,
                index = rejected.index,
                reason = %rejected.reason,
                "skipping malformed reading"
              );
            }
            if attempt > 1 {
              info!(dam_id, retries = attempt - 1, "fetched resources after retrying");
            }
            return Ok(FetchOutcome::Fetched(screened));
          }
          StatusCode::NO_CONTENT | StatusCode::REQUEST_TIMEOUT => {
            warn!(
              dam_id,
              status = %resp.status,
              attempt,
              attempts,
              "upstream has no data or is throttling"
            );
            Error::TransientUpstream { dam_id: dam_id.to_owned(), attempts: attempt }
          }
          StatusCode::UNPROCESSABLE_ENTITY => {
            warn!(dam_id, "upstream rejected dam id (422), skipping");
            return Ok(FetchOutcome::NotAvailable);
          }
          status => {
            error!(dam_id, %status, body = %resp.body, "unexpected upstream status");
            return Err(Error::TerminalUpstream { dam_id: dam_id.to_owned(), status });
          }
        },
        Err(source) => {
          warn!(dam_id, attempt, attempts, error = %source, "upstream request failed");
          Error::Transport { dam_id: dam_id.to_owned(), attempts: attempt, source }
        }
      };

      if attempt >= attempts {
        error!(dam_id, attempts, "giving up on dam");
        return Err(failure);
      }

      let delay = self.policy.delay_after(attempt);
      info!(dam_id, ?delay, "retrying");
      tokio::time::sleep(delay).await;
    }
  }
}
