use castlink::{CastDevice, PluginConfig};

use crate::cmd::{AddDeviceArgs, DevicesCommand};
use crate::exit::{config_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_devices, OutputFormat};

pub fn run(command: DevicesCommand, config: &PluginConfig, format: OutputFormat) -> CliResult<i32> {
    match command {
        DevicesCommand::List => {
            print_devices(&config.devices(), format);
            Ok(SUCCESS)
        }
        DevicesCommand::Add(args) => {
            let id = args.id.clone();
            config
                .add_device(device_from(args))
                .map_err(|err| config_error("failed adding device", err))?;
            tracing::info!(id = %id, "device saved");
            Ok(SUCCESS)
        }
        DevicesCommand::Remove(args) => {
            let removed = config
                .remove_device(&args.id)
                .map_err(|err| config_error("failed removing device", err))?;
            if removed {
                Ok(SUCCESS)
            } else {
                Err(CliError::new(FAILURE, format!("unknown device '{}'", args.id)))
            }
        }
    }
}

fn device_from(args: AddDeviceArgs) -> CastDevice {
    let name = args.name.unwrap_or_else(|| args.id.clone());
    let device = CastDevice::new(args.id, name, args.ip);
    match args.volume {
        Some(volume) => device.with_volume(volume),
        None => device,
    }
}
