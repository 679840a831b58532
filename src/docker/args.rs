// Run request: everything needed to start one container

use crate::volume::Volume;

/// Name of the variable runtime images read the application name from
pub const APP_NAME_VARIABLE: &str = "APPSETTING_WEBSITE_SITE_NAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `-e` argument value: `NAME=value`
    pub fn to_arg(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Arguments for a single container run
#[derive(Debug, Clone, Default)]
pub struct RunArguments {
    pub image: String,
    pub environment: Vec<EnvironmentVariable>,
    pub volumes: Vec<Volume>,
    pub link: Option<String>,
    /// Container port to publish on a host port chosen by the engine
    pub port: Option<u16>,
    pub command: Option<String>,
    pub command_args: Vec<String>,
}

impl RunArguments {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_command<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into());
        self.command_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, environment: Vec<EnvironmentVariable>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<Volume>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }
}
