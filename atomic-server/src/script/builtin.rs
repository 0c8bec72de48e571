//! Bundled engine: shows the entry file as a banner, then runs a small
//! command menu

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use atomic_utils::{AtomicError, Result};

use super::{EntryScript, ScriptEngine, ScriptHost};
use crate::config::DoorConfig;

const PROMPT: &str = "\r\n> ";

const HELP: &str = "Commands:\r\n\
  who            show your nickname and groups\r\n\
  size           show the terminal size\r\n\
  mode [name]    show or set the output mode (utf8, cp437, cp850)\r\n\
  doors          list the programs you may run\r\n\
  door <name>    run a program\r\n\
  quit           leave\r\n";

/// Engine for servers without a script runtime. The entry file's text is
/// the banner.
#[derive(Debug, Clone, Default)]
pub struct BannerEngine {
    doors: BTreeMap<String, DoorConfig>,
}

impl BannerEngine {
    pub fn new(doors: HashMap<String, DoorConfig>) -> Self {
        Self {
            doors: doors.into_iter().collect(),
        }
    }
}

impl ScriptEngine for BannerEngine {
    fn name(&self) -> &'static str {
        "banner"
    }

    fn compile(&self, _path: &Path, source: &str) -> Result<Arc<dyn EntryScript>> {
        Ok(Arc::new(BannerScript {
            banner: source.to_string(),
            doors: self.doors.clone(),
        }))
    }
}

#[derive(Debug)]
struct BannerScript {
    banner: String,
    doors: BTreeMap<String, DoorConfig>,
}

impl BannerScript {
    fn doors_for<'a>(&'a self, host: &'a ScriptHost) -> impl Iterator<Item = (&'a String, &'a DoorConfig)> {
        self.doors.iter().filter(move |(_, door)| match &door.group {
            Some(group) => host.has_group(group),
            None => true,
        })
    }

    fn run_door(&self, host: &ScriptHost, name: &str) -> Result<()> {
        let Some((_, door)) = self.doors_for(host).find(|(door_name, _)| door_name.as_str() == name)
        else {
            host.write(&format!("No such door: {}\r\n", name));
            return Ok(());
        };

        match host.exec(&door.command, &door.args) {
            Ok(code) => {
                debug!(door = %name, exit_code = code, "Door finished");
                Ok(())
            }
            Err(AtomicError::SessionClosed) => Err(AtomicError::SessionClosed),
            Err(e) => {
                host.write(&format!("Cannot run {}: {}\r\n", name, e));
                Ok(())
            }
        }
    }

    fn command(&self, host: &ScriptHost, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(true);
        };

        match command.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "bye" => {
                host.quit();
                return Ok(false);
            }
            "help" | "?" => host.write(HELP),
            "who" => {
                let user = host.get_user();
                host.write(&format!(
                    "{} [{}]\r\n",
                    user.nickname,
                    user.groups.join(", ")
                ));
            }
            "size" => {
                let (cols, rows) = host.get_size();
                host.write(&format!("{}x{}\r\n", cols, rows));
            }
            "mode" => {
                if let Some(name) = words.next() {
                    host.set_output_mode(name);
                }
                host.write(&format!("{}\r\n", host.get_output_mode()));
            }
            "doors" => {
                let names: Vec<&str> = self.doors_for(host).map(|(n, _)| n.as_str()).collect();
                if names.is_empty() {
                    host.write("No doors available\r\n");
                } else {
                    host.write(&format!("{}\r\n", names.join("  ")));
                }
            }
            "door" => match words.next() {
                Some(name) => self.run_door(host, name)?,
                None => host.write("Usage: door <name>\r\n"),
            },
            other => host.write(&format!("Unknown command: {}\r\n", other)),
        }

        Ok(true)
    }
}

impl EntryScript for BannerScript {
    fn run(&self, host: &ScriptHost) -> Result<()> {
        host.clear();
        host.write(&self.banner);
        host.write(&format!(
            "Hello, {}! Type help for commands.\r\n",
            host.get_user().nickname
        ));

        // Ctrl-D leaves from anywhere outside a line
        let quitter = host.clone();
        host.trigger(
            "\x04",
            Arc::new(move |_: &str| -> Result<()> {
                quitter.quit();
                Ok(())
            }),
        );

        loop {
            host.write(PROMPT);
            let line = match host.get_field() {
                Ok(line) => line,
                Err(AtomicError::SessionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            host.write("\r\n");

            if !self.command(host, &line)? {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::session::tests::test_session_with;
    use crate::terminal::tests::drain;
    use crate::terminal::Outgoing;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn door(command: &str, args: &[&str], group: Option<&str>) -> DoorConfig {
        DoorConfig {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            group: group.map(str::to_string),
        }
    }

    fn start(
        doors: HashMap<String, DoorConfig>,
    ) -> (ScriptHost, UnboundedReceiver<Outgoing>, JoinHandle<Result<()>>) {
        let (session, rx) = test_session_with(AppConfig::default());
        let host = ScriptHost::new(session);
        let script = BannerEngine::new(doors)
            .compile(Path::new("init.lua"), "** ATOMIC **\r\n")
            .unwrap();

        let runner = host.clone();
        let handle = thread::spawn(move || script.run(&runner));
        (host, rx, handle)
    }

    fn send_line(host: &ScriptHost, line: &str) {
        for _ in 0..500 {
            if host.session().terminal().is_capturing() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        host.session().terminal().input(&format!("{}\r", line));
    }

    fn output(rx: &mut UnboundedReceiver<Outgoing>) -> String {
        String::from_utf8_lossy(&drain(rx)).into_owned()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_banner_and_who() {
        let (host, mut rx, handle) = start(HashMap::new());

        send_line(&host, "who");
        send_line(&host, "quit");
        handle.join().unwrap().unwrap();

        let out = output(&mut rx);
        assert!(out.contains("** ATOMIC **"));
        assert!(out.contains("Hello, crg!"));
        assert!(out.contains("crg [sysop]"));
        assert!(!host.session().is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_command_and_mode() {
        let (host, mut rx, handle) = start(HashMap::new());

        send_line(&host, "frobnicate");
        send_line(&host, "mode cp850");
        send_line(&host, "bye");
        handle.join().unwrap().unwrap();

        let out = drain(&mut rx);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Unknown command: frobnicate"));
        assert!(text.contains("CP850"));
        assert_eq!(host.get_output_mode(), "CP850");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_doors_filtered_by_group() {
        let mut doors = HashMap::new();
        doors.insert("hello".to_string(), door("sh", &["-c", "printf door-ran"], None));
        doors.insert("admin".to_string(), door("true", &[], Some("wheel")));
        let (host, mut rx, handle) = start(doors);

        send_line(&host, "doors");
        send_line(&host, "door admin");
        send_line(&host, "door hello");
        send_line(&host, "quit");
        handle.join().unwrap().unwrap();

        let out = output(&mut rx);
        assert!(out.contains("hello"));
        assert!(out.contains("No such door: admin"));
        assert!(out.contains("door-ran"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ctrl_d_trigger_quits() {
        let (host, mut rx, handle) = start(HashMap::new());

        for _ in 0..500 {
            if host.session().triggers().contains("\x04") {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        host.session().dispatch(b"\x04").unwrap();
        handle.join().unwrap().unwrap();

        assert!(!host.session().is_connected());
        assert!(output(&mut rx).contains("Goodbye!"));
    }
}
