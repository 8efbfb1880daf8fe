//! # CRD Generator
//!
//! Prints the `SyncPolicy` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/syncpolicy.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use sync_policy_controller::crd::SyncPolicy;

fn main() {
    match serde_yaml::to_string(&SyncPolicy::crd()) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
