use clap::Parser;
use utils::version;

use crate::config::injector::InjectorArgs;

/// Keeps one traffic-injection endpoint per tagged Neutron network.
#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(flatten)]
    pub injector: InjectorArgs,
}
