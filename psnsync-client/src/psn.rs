//! Backend API client.
//!
//! [`PsnClient`] turns endpoint calls into normalized records. The three
//! calls the achievement import depends on sit behind [`TrophyApi`] so the
//! resolver and coordinator can be driven without a network.

use crate::endpoints::{self, MAX_TITLE_IDS_PER_REQUEST};
use crate::parsers;
use crate::pipeline::AuthenticatedClient;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use psnsync_core::{
    Achievement, CommunicationId, FriendInfo, GameId, GameTime, OwnedGame, ParseError, PsnError,
    PsnResult, TrophyTitleInfo, UnixTimestamp, UserInfo, UserPresence,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Trophy endpoints used by title resolution and achievement import.
#[async_trait]
pub trait TrophyApi: Send + Sync {
    /// Trophy title info for at most [`MAX_TITLE_IDS_PER_REQUEST`] games.
    /// Every requested id is a key of the result.
    async fn trophy_title_info_map(
        &self,
        game_ids: &[GameId],
    ) -> PsnResult<HashMap<GameId, Vec<TrophyTitleInfo>>>;

    /// Last update time per communication id.
    async fn trophy_titles(&self) -> PsnResult<HashMap<CommunicationId, UnixTimestamp>>;

    /// Earned trophies of one communication id.
    async fn earned_trophies(
        &self,
        communication_id: &CommunicationId,
    ) -> PsnResult<Vec<Achievement>>;
}

pub struct PsnClient {
    http: Arc<AuthenticatedClient>,
    page_limit: usize,
}

fn parse_failure(url: &str, err: ParseError) -> PsnError {
    tracing::error!(url = %url, error = %err, "Cannot parse data");
    PsnError::from(err)
}

impl PsnClient {
    pub fn new(http: Arc<AuthenticatedClient>) -> Self {
        Self::with_page_limit(http, endpoints::DEFAULT_PAGE_LIMIT)
    }

    pub fn with_page_limit(http: Arc<AuthenticatedClient>, page_limit: usize) -> Self {
        Self {
            http,
            page_limit: page_limit.max(1),
        }
    }

    pub fn http(&self) -> &Arc<AuthenticatedClient> {
        &self.http
    }

    /// Fetch one document and parse it.
    async fn fetch_data<T>(
        &self,
        url: &str,
        parser: impl FnOnce(&Value) -> Result<T, ParseError>,
    ) -> PsnResult<T> {
        let value = self.http.get_json(url).await?;
        parser(&value).map_err(|e| parse_failure(url, e))
    }

    /// Fetch every page of a listing.
    ///
    /// The first page's `totalResults` decides the remaining offsets, which
    /// are requested concurrently. Any failing page fails the listing.
    async fn fetch_paginated<T>(
        &self,
        url: &str,
        parser: impl Fn(&Value) -> Result<Vec<T>, ParseError>,
    ) -> PsnResult<Vec<T>> {
        let limit = self.page_limit;
        let first = self
            .http
            .get_json(&endpoints::paginate_url(url, limit, 0))
            .await?;
        if parsers::is_empty_payload(&first) {
            return Ok(Vec::new());
        }

        let total = parsers::parse_total_results(&first).map_err(|e| parse_failure(url, e))?;
        let rest = try_join_all(
            (limit..total)
                .step_by(limit)
                .map(|offset| endpoints::paginate_url(url, limit, offset))
                .map(|page_url| async move { self.http.get_json(&page_url).await }),
        )
        .await?;

        tracing::debug!(url = %url, total, pages = rest.len() + 1, "Fetched paginated listing");
        let mut records = Vec::new();
        for page in std::iter::once(&first).chain(rest.iter()) {
            records.extend(parser(page).map_err(|e| parse_failure(url, e))?);
        }
        Ok(records)
    }

    pub async fn user_info(&self) -> PsnResult<UserInfo> {
        self.fetch_data(&endpoints::user_info_url(), parsers::parse_user_info)
            .await
    }

    /// Every title in the library, DLC included.
    pub async fn owned_games(&self) -> PsnResult<Vec<OwnedGame>> {
        self.fetch_paginated(&endpoints::game_list_url(), parsers::parse_owned_games)
            .await
    }

    pub async fn friends(&self) -> PsnResult<Vec<FriendInfo>> {
        self.fetch_paginated(&endpoints::friends_url(), parsers::parse_friends)
            .await
    }

    pub async fn friend_presences(&self) -> PsnResult<HashMap<String, UserPresence>> {
        let presences = self
            .fetch_paginated(&endpoints::friends_presence_url(), parsers::parse_presences)
            .await?;
        Ok(presences.into_iter().collect())
    }

    pub async fn played_games(&self) -> PsnResult<Vec<GameTime>> {
        self.fetch_paginated(&endpoints::played_games_url(), parsers::parse_played_games)
            .await
    }

    pub async fn psplus_status(&self) -> PsnResult<bool> {
        let url = endpoints::psplus_status_url();
        let body = json!({"operationName": "getProfileOracle", "variables": {}});
        let response = self.http.post(&url, &body).await?;
        let value = response.json().map_err(|e| parse_failure(&url, e))?;
        parsers::parse_psplus_status(&value).map_err(|e| parse_failure(&url, e))
    }
}

#[async_trait]
impl TrophyApi for PsnClient {
    async fn trophy_title_info_map(
        &self,
        game_ids: &[GameId],
    ) -> PsnResult<HashMap<GameId, Vec<TrophyTitleInfo>>> {
        if game_ids.len() > MAX_TITLE_IDS_PER_REQUEST {
            return Err(PsnError::InvalidParams {
                reason: format!(
                    "{} title ids exceed the per-request limit of {}",
                    game_ids.len(),
                    MAX_TITLE_IDS_PER_REQUEST
                ),
            });
        }
        if game_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.fetch_data(&endpoints::game_details_url(game_ids), |value| {
            Ok(parsers::parse_trophy_title_info_map(value, game_ids))
        })
        .await
    }

    async fn trophy_titles(&self) -> PsnResult<HashMap<CommunicationId, UnixTimestamp>> {
        let titles = self
            .fetch_paginated(&endpoints::trophy_titles_url(), parsers::parse_trophy_titles)
            .await?;
        Ok(titles
            .into_iter()
            .map(|title| (title.communication_id, title.last_update_time))
            .collect())
    }

    async fn earned_trophies(
        &self,
        communication_id: &CommunicationId,
    ) -> PsnResult<Vec<Achievement>> {
        self.fetch_data(&endpoints::earned_trophies_url(communication_id), |value| {
            parsers::parse_earned_trophies(value, communication_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_gate::{TokenExchange, TokenGate, TokenGrant};
    use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
    use parking_lot::Mutex;
    use psnsync_core::TransportError;

    /// Serves canned bodies by URL substring and records every request.
    struct RoutedTransport {
        routes: Vec<(&'static str, String)>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl Transport for RoutedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let body = self
                .routes
                .iter()
                .find(|(pattern, _)| request.url.contains(pattern))
                .map(|(_, body)| body.clone());
            self.seen.lock().push(request);
            body.map(|body| HttpResponse::new(200, body))
                .ok_or(TransportError::Backend { status: 404 })
        }

        async fn close(&self) {}
    }

    struct StaticExchange;

    #[async_trait]
    impl TokenExchange for StaticExchange {
        async fn exchange(&self, _refresh_token: &str) -> PsnResult<TokenGrant> {
            Ok(TokenGrant::new("token"))
        }
    }

    async fn client(routes: Vec<(&'static str, Value)>, page_limit: usize) -> (PsnClient, Arc<RoutedTransport>) {
        let transport = Arc::new(RoutedTransport {
            routes: routes
                .into_iter()
                .map(|(pattern, body)| (pattern, body.to_string()))
                .collect(),
            seen: Mutex::new(Vec::new()),
        });
        let gate = TokenGate::new(Arc::new(StaticExchange));
        gate.authenticate("npsso").await.expect("authenticate should succeed");
        let http = Arc::new(AuthenticatedClient::new(transport.clone(), gate));
        (PsnClient::with_page_limit(http, page_limit), transport)
    }

    #[tokio::test]
    async fn test_paginated_listing_fetches_remaining_offsets() {
        let page = |ids: &[u64]| {
            json!({
                "totalResults": 5,
                "profiles": ids.iter().map(|id| json!({"accountId": id, "onlineId": format!("user{}", id)})).collect::<Vec<_>>()
            })
        };
        let (client, transport) = client(
            vec![
                ("offset=0", page(&[1, 2])),
                ("offset=2", page(&[3, 4])),
                ("offset=4", page(&[5])),
            ],
            2,
        )
        .await;

        let friends = client.friends().await.expect("listing should succeed");
        let ids: Vec<_> = friends.iter().map(|f| f.user_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(transport.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_first_page_is_empty_listing() {
        let (client, transport) = client(vec![("titles", json!({}))], 100).await;
        assert_eq!(client.owned_games().await, Ok(Vec::new()));
        assert_eq!(transport.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_counter_is_unknown_response() {
        let (client, _) = client(
            vec![("friends", json!({"totalResults": "lots", "profiles": []}))],
            100,
        )
        .await;
        assert!(matches!(
            client.friends().await,
            Err(PsnError::UnknownBackendResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_title_info_rejects_oversized_batch() {
        let (client, transport) = client(Vec::new(), 100).await;
        let ids: Vec<_> = (0..6).map(|i| GameId::new(format!("CUSA{}_00", i))).collect();
        assert!(matches!(
            client.trophy_title_info_map(&ids).await,
            Err(PsnError::InvalidParams { .. })
        ));
        assert!(transport.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_trophy_titles_map_watermarks() {
        let (client, _) = client(
            vec![(
                "trophyTitles?",
                json!({"totalResults": 1, "trophyTitles": [
                    {"npCommunicationId": "NPWR1_00", "fromUser": {"lastUpdateDate": "1970-01-01T00:01:40Z"}}
                ]}),
            )],
            100,
        )
        .await;
        let titles = client.trophy_titles().await.expect("titles should load");
        assert_eq!(titles.get(&CommunicationId::new("NPWR1_00")), Some(&100));
    }

    #[tokio::test]
    async fn test_psplus_status_posts_query() {
        let (client, transport) = client(
            vec![(
                "graphql",
                json!({"data": {"oracleUserProfileRetrieve": {"isPsPlusMember": false}}}),
            )],
            100,
        )
        .await;
        assert_eq!(client.psplus_status().await, Ok(false));
        assert_eq!(transport.seen.lock()[0].method, Method::Post);
    }
}
