use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::source::PlatformSource;
use super::types::{ChallengeSnapshot, SolveSnapshot, SolverSnapshot, UserRef, UserSnapshot};
use crate::config::Config;

/// HTTP client for the platform's JSON API.
///
/// The API key travels as a cookie; the catalog pages with an offset
/// parameter and each challenge's validations come from its detail
/// endpoint, so one catalog pass is many requests and the platform's rate
/// limit is the real bound on polling frequency.
pub struct RootMeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    lang: String,
}

impl RootMeClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            lang: config.search_lang.clone(),
        })
    }

    /// GET a JSON document. `None` on 404; rate limiting and any other
    /// non-success status are transient errors for the caller to absorb.
    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .header(reqwest::header::COOKIE, format!("api_key={}", self.api_key))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => bail!("rate limited by platform ({url})"),
            status if status.is_success() => {
                let body = response
                    .json::<T>()
                    .await
                    .with_context(|| format!("invalid response body from {url}"))?;
                Ok(Some(body))
            }
            status => bail!("unexpected status {status} from {url}"),
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireChallengePage {
    #[serde(default)]
    challenges: Vec<WireChallengeSummary>,
    #[serde(default)]
    next_offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireChallengeSummary {
    id_challenge: u32,
}

#[derive(Debug, Deserialize)]
struct WireChallengeDetail {
    id_challenge: u32,
    titre: String,
    rubrique: String,
    difficulte: String,
    score: u32,
    #[serde(default)]
    validations: Vec<WireValidation>,
}

#[derive(Debug, Deserialize)]
struct WireValidation {
    id_auteur: u32,
    nom: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct WireAuteur {
    id_auteur: u32,
    nom: String,
    score: u32,
    #[serde(default)]
    validations: Vec<WireAuteurValidation>,
}

#[derive(Debug, Deserialize)]
struct WireAuteurValidation {
    id_challenge: u32,
    date: String,
}

#[derive(Debug, Deserialize)]
struct WireUserRef {
    id_auteur: u32,
    nom: String,
}

/// Validation dates come as naive `YYYY-MM-DD HH:MM:SS` strings; the
/// platform serves them in UTC.
fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("unparseable validation date {raw:?}"))?;
    Ok(naive.and_utc())
}

fn challenge_from_detail(detail: WireChallengeDetail) -> Result<ChallengeSnapshot> {
    let mut solvers = Vec::with_capacity(detail.validations.len());
    for validation in detail.validations {
        solvers.push(SolverSnapshot {
            idx: validation.id_auteur,
            username: validation.nom,
            date: parse_date(&validation.date)?,
        });
    }
    Ok(ChallengeSnapshot {
        idx: detail.id_challenge,
        title: detail.titre,
        category: detail.rubrique,
        difficulty: detail.difficulte,
        score: detail.score,
        solvers,
    })
}

fn user_from_auteur(auteur: WireAuteur) -> Result<UserSnapshot> {
    let mut solves = Vec::with_capacity(auteur.validations.len());
    for validation in auteur.validations {
        solves.push(SolveSnapshot {
            challenge_idx: validation.id_challenge,
            date: parse_date(&validation.date)?,
        });
    }
    Ok(UserSnapshot {
        idx: auteur.id_auteur,
        username: auteur.nom,
        score: auteur.score,
        solves,
    })
}

#[async_trait]
impl PlatformSource for RootMeClient {
    async fn fetch_all_challenges(&self) -> Result<Vec<ChallengeSnapshot>> {
        let mut ids = Vec::new();
        let mut offset = 0u64;
        loop {
            let page: WireChallengePage = self
                .get_json("challenges", &[("debut_challenges", offset.to_string())])
                .await?
                .context("challenge catalog endpoint returned 404")?;
            ids.extend(page.challenges.into_iter().map(|c| c.id_challenge));
            match page.next_offset {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }
        debug!(count = ids.len(), "fetched challenge catalog index");

        let mut snapshots = Vec::with_capacity(ids.len());
        for id in ids {
            let detail: WireChallengeDetail = self
                .get_json(&format!("challenges/{id}"), &[])
                .await?
                .with_context(|| format!("challenge {id} vanished between list and detail"))?;
            snapshots.push(challenge_from_detail(detail)?);
        }
        Ok(snapshots)
    }

    async fn fetch_user(&self, idx: u32) -> Result<Option<UserSnapshot>> {
        match self.get_json::<WireAuteur>(&format!("auteurs/{idx}"), &[]).await? {
            Some(auteur) => Ok(Some(user_from_auteur(auteur)?)),
            None => Ok(None),
        }
    }

    async fn search_users_by_name(&self, name: &str) -> Result<Vec<UserRef>> {
        let hits = self
            .get_json::<Vec<WireUserRef>>(
                "auteurs",
                &[("nom", name.to_string()), ("lang", self.lang.clone())],
            )
            .await?
            .unwrap_or_default();
        Ok(hits
            .into_iter()
            .map(|hit| UserRef { idx: hit.id_auteur, username: hit.nom })
            .collect())
    }
}
