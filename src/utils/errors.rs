//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

use crate::manager::TopologyError;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    let error_msg = error.to_string();

    if let Some(topology_error) = error.downcast_ref::<TopologyError>() {
        format_topology_error(&mut output, topology_error);
    } else if error_msg.contains("X server") || error_msg.contains("RandR") {
        format_display_error(&mut output, &error_msg);
    } else if error_msg.contains("request") {
        format_request_error(&mut output, &error_msg);
    } else if error_msg.contains("config") {
        format_config_error(&mut output, &error_msg);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-display-manager -vvv show"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Print the current topology: lamco-display-manager show --format json"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_topology_error(output: &mut String, error: &TopologyError) {
    match error {
        TopologyError::StaleRequest { expected, got } => {
            writeln!(output, "Configuration Out of Date").ok();
            writeln!(output).ok();
            writeln!(
                output,
                "The request was built for serial {}, but the topology is now at {}.",
                got, expected
            )
            .ok();
            writeln!(output, "Monitors changed since the request was written.").ok();
            writeln!(output).ok();
            writeln!(output, "  → Run 'lamco-display-manager show' and rebuild the request").ok();
            writeln!(output, "  → Or drop 'serial' from the file to use the current one").ok();
        }
        TopologyError::Validation(reason) => {
            writeln!(output, "Invalid Configuration").ok();
            writeln!(output).ok();
            writeln!(output, "The request was rejected before anything changed:").ok();
            writeln!(output, "  {}", reason).ok();
            writeln!(output).ok();
            writeln!(output, "  → Check ids against 'lamco-display-manager show'").ok();
            writeln!(output, "  → Modes must be listed by every output on the CRTC").ok();
            writeln!(output, "  → Rectangles must fit the maximum screen size").ok();
        }
        TopologyError::Unsupported(what) => {
            writeln!(output, "Operation Not Supported").ok();
            writeln!(output).ok();
            writeln!(output, "Not available here: {}", what).ok();
            writeln!(output).ok();
            writeln!(output, "  → Persistent configuration is never supported").ok();
            writeln!(output, "  → Compositor-enumerated topologies are read-only").ok();
        }
        TopologyError::Backend(e) => {
            writeln!(output, "Display Hardware Error").ok();
            writeln!(output).ok();
            writeln!(output, "The display backend refused the change: {}", e).ok();
        }
        TopologyError::ServiceStopped => {
            writeln!(output, "Topology Service Stopped").ok();
            writeln!(output).ok();
            writeln!(output, "The topology thread exited before answering.").ok();
        }
    }
}

fn format_display_error(output: &mut String, _error: &str) {
    writeln!(output, "Display Server Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not talk to the X server's RandR extension.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. DISPLAY is not set or points at a stopped server").ok();
    writeln!(output, "     → Check: echo $DISPLAY").ok();
    writeln!(output, "     → Or pass: --display :0").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Running headless").ok();
    writeln!(output, "     → Use: --backend synthetic").ok();
}

fn format_request_error(output: &mut String, _error: &str) {
    writeln!(output, "Request File Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not read the configuration request.").ok();
    writeln!(output).ok();
    writeln!(output, "  → Requests are TOML, or JSON when the file ends in .json").ok();
    writeln!(output, "  → Each [[crtcs]] entry needs 'crtc'; omit 'mode' to disable").ok();
}

fn format_config_error(output: &mut String, _error: &str) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Configuration file not found").ok();
    writeln!(
        output,
        "     → Default location: /etc/lamco-display-manager/config.toml"
    )
    .ok();
    writeln!(
        output,
        "     → Or specify: lamco-display-manager -c /path/to/config.toml"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Invalid values").ok();
    writeln!(output, "     → backend.kind: auto, xrandr, enumeration or synthetic").ok();
    writeln!(output, "     → Synthetic modes and rectangles must be non-empty").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Display Manager Error").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
    writeln!(output).ok();
    writeln!(output, "Troubleshooting:").ok();
    writeln!(output).ok();
    writeln!(output, "  → Run with -vvv and check which backend was selected").ok();
    writeln!(output, "  → Force one with LAMCO_DEBUG_MULTIMONITOR=synthetic").ok();
}
