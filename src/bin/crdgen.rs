use kube::CustomResourceExt;
use ps_operator::crd::PerconaServerMySQL;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&PerconaServerMySQL::crd())?);
    Ok(())
}
