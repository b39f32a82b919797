use anyhow::{Result, bail};
use clap::Parser;
use drm_fairplay::{DerivedContentKeys, LicenseRequestBuilder, issue_license};

use super::KeySourceArgs;

const CHECK_ASSET: &str = "ksm-check-keys";

#[derive(Parser, Debug, Clone, Default)]
pub struct CheckKeysCommand {
    #[command(flatten)]
    pub keys: KeySourceArgs,
}

impl CheckKeysCommand {
    /**
        Load every tenant, then push one locally built request through the
        engine per tenant to prove the certificate, private key and ASk work
        together.
    */
    pub async fn run(self) -> Result<()> {
        let tenants = match self.keys.load() {
            Ok(tenants) => tenants,
            Err(e) => {
                println!("FAILED  {e:#}");
                return Err(e);
            }
        };

        let derived_keys = DerivedContentKeys::default();
        let mut failures = 0usize;

        for id in tenants.ids() {
            let Some(tenant) = tenants.resolve(Some(id)) else {
                continue;
            };
            let built = LicenseRequestBuilder::new(CHECK_ASSET).build(tenant.keys.public_key());
            let result = match built {
                Ok(token) => issue_license(&tenant.keys, &derived_keys, &token)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => println!("OK      {id}  RSA-{}", tenant.keys.key_bits()),
                Err(e) => {
                    failures += 1;
                    println!("FAILED  {id}  {e}");
                }
            }
        }

        if failures > 0 {
            bail!("{failures} of {} tenants failed", tenants.len());
        }
        println!("{} tenant(s) ready", tenants.len());
        Ok(())
    }
}
