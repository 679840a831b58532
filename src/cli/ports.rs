use crate::docker::ports::{next_free_port, parse_port_mapping};
use crate::errors::{HarnessError, Result};

/// Parse `docker port` output and print the host port
pub fn parse(mapping: &str, json: bool) -> Result<()> {
    let mapping = parse_port_mapping(mapping)?;

    if json {
        let rendered = serde_json::to_string_pretty(&mapping)
            .map_err(|e| HarnessError::CommandFailed(format!("Failed to render JSON: {}", e)))?;
        println!("{}", rendered);
    } else {
        println!("{}", mapping.host_port);
    }

    Ok(())
}

/// Print a host port that is currently free
pub fn free() -> Result<()> {
    println!("{}", next_free_port()?);
    Ok(())
}
