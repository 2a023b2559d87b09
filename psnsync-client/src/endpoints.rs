//! Backend endpoint URLs.

use psnsync_core::{CommunicationId, GameId};

/// Hard backend limit on title ids per trophy-title-info request.
pub const MAX_TITLE_IDS_PER_REQUEST: usize = 5;

/// Default page size of paginated listings.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

pub const OAUTH_LOGIN_REDIRECT_URL: &str = "https://my.playstation.com/auth/response.html";

const OAUTH_URL_BASE: &str = concat!(
    "https://auth.api.sonyentertainmentnetwork.com/2.0/oauth/authorize",
    "?response_type=token",
    "&scope=capone:report_submission,kamaji:game_list,kamaji:get_account_hash,",
    "user:account.get,user:account.profile.get,kamaji:social_get_graph,",
    "kamaji:ugc:distributor,user:account.identityMapper,kamaji:music_views,",
    "kamaji:activity_feed_get_feed_privacy,kamaji:activity_feed_get_news_feed,",
    "kamaji:activity_feed_submit_feed_story,kamaji:activity_feed_internal_feed_submit_story,",
    "kamaji:account_link_token_web,kamaji:ugc:distributor_web,kamaji:url_preview",
    "&client_id=656ace0b-d627-47e6-915c-13b259cd06b2",
    "&redirect_uri=https://my.playstation.com/auth/response.html",
);

/// Interactive login page shown by the host.
pub fn oauth_login_url() -> String {
    format!(
        "{}{}",
        OAUTH_URL_BASE,
        concat!(
            "&requestID=external_request_e0002664-7e12-474b-ba44-495683d32d3c",
            "&baseUrl=/&returnRoute=/&targetOrigin=https://my.playstation.com",
            "&excludeQueryParams=true&prompt=login&tp_console=true&ui=pr",
        )
    )
}

/// Silent authorize request answered with a redirect carrying the token.
pub fn oauth_token_url() -> String {
    format!(
        "{}{}",
        OAUTH_URL_BASE,
        concat!(
            "&requestID=iframe_request_c37ac45d-d6f2-4585-b93f-da014fe87579",
            "&baseUrl=/&targetOrigin=https://my.playstation.com&prompt=none",
        )
    )
}

pub fn game_details_url(game_ids: &[GameId]) -> String {
    let ids = game_ids
        .iter()
        .map(GameId::as_str)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "https://pl-tpy.np.community.playstation.net/trophy/v1/apps/trophyTitles?npTitleIds={}&fields=@default&npLanguage=en",
        ids
    )
}

pub fn game_list_url() -> String {
    "https://gamelist.api.playstation.com/v1/users/me/titles?type=owned,played&app=richProfile&sort=-lastPlayedDate&iw=240&ih=240&fields=@default".to_string()
}

pub fn played_games_url() -> String {
    "https://gamelist.api.playstation.com/v2/users/me/titles?categories=ps4_game,ps5_native_game".to_string()
}

pub fn trophy_titles_url() -> String {
    "https://pl-tpy.np.community.playstation.net/trophy/v1/trophyTitles?fields=@default&platform=PS4&npLanguage=en".to_string()
}

pub fn earned_trophies_url(communication_id: &CommunicationId) -> String {
    format!(
        "https://pl-tpy.np.community.playstation.net/trophy/v1/trophyTitles/{}/trophyGroups/all/trophies?fields=@default,trophyRare,trophyEarnedRate,trophySmallIconUrl,groupId&visibleType=1&npLanguage=en",
        urlencoding::encode(communication_id.as_str())
    )
}

pub fn user_info_url() -> String {
    "https://pl-prof.np.community.playstation.net/userProfile/v1/users/me/profile2?fields=accountId,onlineId".to_string()
}

pub fn friends_url() -> String {
    "https://us-prof.np.community.playstation.net/userProfile/v1/users/me/friends/profiles2?fields=accountId,onlineId".to_string()
}

pub fn friends_presence_url() -> String {
    "https://us-prof.np.community.playstation.net/userProfile/v1/users/me/friends/profiles2?fields=accountId,onlineId,primaryOnlineStatus,presences(@titleInfo,platform,lastOnlineDate)".to_string()
}

pub fn psplus_status_url() -> String {
    "https://web.np.playstation.com/api/graphql/v1/op?operationName=getProfileOracle".to_string()
}

/// Append paging parameters to a listing URL.
pub fn paginate_url(url: &str, limit: usize, offset: usize) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}limit={}&offset={}", url, separator, limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_url() {
        assert_eq!(
            paginate_url("https://x/titles?a=1", 100, 200),
            "https://x/titles?a=1&limit=100&offset=200"
        );
        assert_eq!(
            paginate_url("https://x/titles", 10, 0),
            "https://x/titles?limit=10&offset=0"
        );
    }

    #[test]
    fn test_game_details_url_joins_ids() {
        let url = game_details_url(&[GameId::new("CUSA1_00"), GameId::new("CUSA2_00")]);
        assert!(url.contains("npTitleIds=CUSA1_00,CUSA2_00&"));
    }

    #[test]
    fn test_oauth_urls_share_base() {
        assert!(oauth_token_url().contains("prompt=none"));
        assert!(oauth_login_url().contains("prompt=login"));
        assert!(oauth_token_url().contains(OAUTH_LOGIN_REDIRECT_URL));
    }
}
