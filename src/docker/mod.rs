pub mod args;
pub mod cli;
pub mod ports;
pub mod result;

pub use args::{EnvironmentVariable, RunArguments, APP_NAME_VARIABLE};
pub use cli::{ContainerCli, DockerCli};
pub use ports::{next_free_port, parse_port_mapping, PortMapping};
pub use result::{BackgroundRun, ProcessState, RunResult};
