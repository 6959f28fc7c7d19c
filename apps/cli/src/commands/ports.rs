//! 列出本机串口

use anyhow::Result;
use plinth_transport::SerialTransport;

pub fn execute() -> Result<()> {
    let ports = SerialTransport::available_ports()?;
    if ports.is_empty() {
        println!("(未发现串口)");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}
