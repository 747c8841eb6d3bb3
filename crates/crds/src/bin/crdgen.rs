//! Prints the CRD manifests as YAML, for `kubectl apply -f -`.

use crds::ManagedSecret;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ManagedSecret::crd())?);
    Ok(())
}
