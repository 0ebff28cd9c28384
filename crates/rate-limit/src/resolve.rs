//! Builds the bucket chain for a single acquisition from a send-config's
//! module, optional managed service, and rate-limit overrides.

use {crate::bucket::BucketSpec, model::{ModuleKind, RateLimitOverride, SendConfigId}};

/// Per-service defaults, descending preference below `RateLimitOverride`'s
/// own fields: `ses` and `telnyx` undercut their module's generic default
/// because those providers throttle harder than Resend/generic webhooks.
fn provider_default_requests_per_second(service: &str, module: ModuleKind) -> u32 {
    match service {
        "ses" => 14,
        "resend" => 100,
        "telnyx" => 15,
        "webhook" => 20,
        _ => module.default_requests_per_second(),
    }
}

/// Builds the acquisition chain for one send-config.
///
/// `managed_service` is `Some("ses"|"resend"|"telnyx"|"mock")` for a shared
/// managed profile, or `None` for BYOK/webhook sends — in the latter case
/// there's no provider bucket shared across tenants, just `{system, config}`.
pub fn build_chain(
    send_config_id: SendConfigId,
    module: ModuleKind,
    rate_limit: &RateLimitOverride,
    managed_service: Option<&str>,
    system_requests_per_second: u32,
) -> Vec<BucketSpec> {
    let mut chain = vec![BucketSpec::system(system_requests_per_second)];
    if let Some(service) = managed_service {
        let provider_rps = provider_default_requests_per_second(service, module);
        chain.push(BucketSpec::provider(service, provider_rps));
    }
    let config_rps = rate_limit.effective_requests_per_second(module);
    chain.push(BucketSpec::send_config(send_config_id, config_rps));
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byok_chain_has_no_provider_bucket() {
        let chain = build_chain(
            SendConfigId(uuid::Uuid::nil()),
            ModuleKind::Webhook,
            &RateLimitOverride::default(),
            None,
            1000,
        );
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].key, "rl:system:bucket");
    }

    #[test]
    fn managed_ses_chain_has_three_buckets_with_ses_default() {
        let chain = build_chain(
            SendConfigId(uuid::Uuid::nil()),
            ModuleKind::Email,
            &RateLimitOverride::default(),
            Some("ses"),
            1000,
        );
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].requests_per_second, 14.0);
    }
}
