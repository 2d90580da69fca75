use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Profile record associated with a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    /// Some deployments omit the profile from the login response; the
    /// session layer substitutes one built from the submitted email.
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KrwToXrpRequest {
    pub krw_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XrpToKrwRequest {
    pub xrp_amount: f64,
}

/// Conversion endpoints fill in whichever of these fields they computed;
/// resolution to a usable rate happens in the rate service, not here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    #[serde(default)]
    pub krw_amount: Option<f64>,
    #[serde(default)]
    pub xrp_amount: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub converted_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferCreateRequest {
    pub iou: String,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferCreateResponse {
    /// Opaque offer identifier; rendered verbatim as the QR payload.
    pub qr_code: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferFinishRequest {
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferCancelRequest {
    pub uuid: String,
}

/// Minimal acknowledgement body; endpoints that return nothing useful
/// still parse into this.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "XRP")]
    pub xrp: Option<f64>,
    #[serde(default, rename = "KRW")]
    pub krw: Option<f64>,
    #[serde(default, rename = "USD")]
    pub usd: Option<f64>,
}

/// One entry of `GET /api/transaction/history`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub is_receiver: bool,
    pub is_success: bool,
    pub amount: f64,
    pub price: f64,
    pub iou: String,
    pub transaction_date: String,
}

/// Error payload shape shared by the backend's failure responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
