pub mod gateway;
pub mod links;
pub mod webhook;

use axum::{routing::post, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/payments/razorpay/webhook", post(webhook::razorpay_webhook))
}
