//! Authentication state trait and macro.

use crate::jwt::TokenCodec;

/// State types that can validate access tokens.
pub trait HasTokenCodec {
    fn codec(&self) -> &TokenCodec;
}

/// Implement `HasTokenCodec` for a state struct with a `codec: Arc<TokenCodec>` field.
#[macro_export]
macro_rules! impl_has_token_codec {
    ($state_type:ty) => {
        impl $crate::auth::HasTokenCodec for $state_type {
            fn codec(&self) -> &$crate::jwt::TokenCodec {
                &self.codec
            }
        }
    };
}
