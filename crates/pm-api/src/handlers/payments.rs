//! Invoice creation and payment lookups. Mounted only with the bot enabled.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::State;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub pokemon_id: Uuid,
    pub units: i64,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRequest {
    pub invoice_payload: String,
}

pub async fn create_invoice(
    data: State,
    body: web::Json<CreateInvoiceRequest>,
) -> ApiResult<HttpResponse> {
    let req = body.into_inner();
    log::info!(
        "Creating invoice for user {}, pokemon {}, units {}",
        req.user_id,
        req.pokemon_id,
        req.units
    );

    let invoice = data
        .settlement()?
        .create_invoice(req.user_id, req.pokemon_id, req.units)
        .await?;
    Ok(HttpResponse::Ok().json(invoice))
}

pub async fn payment_status(
    data: State,
    body: web::Json<PaymentStatusRequest>,
) -> ApiResult<HttpResponse> {
    let status = data
        .settlement()?
        .get_payment_status(&body.invoice_payload)
        .await?;
    Ok(HttpResponse::Ok().json(status))
}

pub async fn user_purchases(data: State, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let purchases = data.settlement()?.user_purchases(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(purchases))
}
