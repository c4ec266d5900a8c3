//! Magic tokens: `<6 uppercase hex>-<year>`, one active token per patient.

use rand::Rng;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::error::{AuthError, AuthResult};
use crate::store::{Store, StoreError};

const MAX_ATTEMPTS: usize = 8;

/// Draw a candidate token for the given year.
pub fn generate_token<R: Rng + ?Sized>(rng: &mut R, year: i32) -> String {
    let n: u32 = rng.gen_range(0..=0xFF_FFFF);
    format!("{n:06X}-{year}")
}

/// Canonical lookup form of a user-typed token.
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Generate a fresh unique token and make it the patient's only active one.
///
/// The previous token stops working as soon as this returns.
#[instrument(skip(store))]
pub async fn issue_magic_token(store: &dyn Store, patient_id: &str) -> AuthResult<String> {
    let year = OffsetDateTime::now_utc().year();
    for attempt in 1..=MAX_ATTEMPTS {
        let candidate = generate_token(&mut rand::thread_rng(), year);
        if store.token_in_use(&candidate).await? {
            warn!(attempt, "magic token collision; retrying");
            continue;
        }
        match store.save_token(patient_id, &candidate).await {
            Ok(()) => {
                info!(%patient_id, "magic token issued");
                return Ok(candidate);
            }
            Err(StoreError::Conflict(_)) => {
                warn!(attempt, "magic token taken concurrently; retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AuthError::Internal(format!(
        "could not find a free magic token after {MAX_ATTEMPTS} attempts"
    )))
}
