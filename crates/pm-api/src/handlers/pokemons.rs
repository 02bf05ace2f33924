use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use super::State;
use crate::error::ApiResult;

pub async fn list_pokemons(data: State) -> ApiResult<HttpResponse> {
    let pokemons = data.catalogue.list_items().await?;
    Ok(HttpResponse::Ok().json(json!({
        "total": pokemons.len(),
        "pokemons": pokemons,
    })))
}

pub async fn get_pokemon(data: State, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let item = data.catalogue.get_item(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(item))
}
