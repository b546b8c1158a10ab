use reqwest::Client;

use crate::{model::ArtistProfile, tracker::ApiError, types::ArtistResponse};

use super::player::{send, transport_error};

/// Looks up an artist's name, image and genres.
pub async fn get_artist(
    client: &Client,
    api_url: &str,
    token: &str,
    artist_id: &str,
) -> Result<ArtistProfile, ApiError> {
    let url = format!("{api_url}/artists/{artist_id}");
    let response = send(client, &url, token).await?;
    let json: ArtistResponse = response.json().await.map_err(transport_error)?;

    Ok(json.into_profile())
}
