//! Default configuration values
//!
//! These are embedded in the binary and used when no config file exists.

/// Default configuration as TOML (for reference/documentation)
#[allow(dead_code)]
pub const DEFAULT_CONFIG_TOML: &str = r##"
# atomic configuration

[server]
listen = "0.0.0.0:2200"
entry_script = "init.lua"
guest_nickname = "guest"
banner = "Welcome to atomic BBS\r\n"
goodbye = "\r\nGoodbye!\r\n"

[terminal]
# utf8, cp437 or cp850
output_mode = "utf8"
max_input_length = 80
output_delay_ms = 0
# Byte sent for characters the code page cannot represent
unmapped_byte = 0
# 0 waits forever for a line
input_timeout_secs = 0
default_cols = 80
default_rows = 24

[session]
max_env_entries = 1000
read_buffer_size = 1024
resize_poll_ms = 100

# [users.sysop]
# groups = ["sysop"]

# [doors.nethack]
# command = "/usr/games/nethack"
# args = []
# group = "players"
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ConfigLoader};

    #[test]
    fn test_default_toml_matches_built_in_defaults() {
        let parsed: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        let built_in = AppConfig::default();

        assert_eq!(parsed.server.listen, built_in.server.listen);
        assert_eq!(parsed.server.entry_script, built_in.server.entry_script);
        assert_eq!(parsed.server.banner, built_in.server.banner);
        assert_eq!(parsed.server.goodbye, built_in.server.goodbye);
        assert_eq!(parsed.terminal.output_mode, built_in.terminal.output_mode);
        assert_eq!(
            parsed.terminal.max_input_length,
            built_in.terminal.max_input_length
        );
        assert_eq!(
            parsed.session.max_env_entries,
            built_in.session.max_env_entries
        );
        assert!(ConfigLoader::validate(&parsed).is_ok());
    }
}
