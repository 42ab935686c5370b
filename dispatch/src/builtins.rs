//! Built-in demonstration handlers.
//!
//! | name         | parameters                  | output                               |
//! |--------------|-----------------------------|--------------------------------------|
//! | `helloworld` | `action=sayhello`, `name`*  | one greeting per `name`              |
//! | `echo`       |                             | the request payload, unchanged       |
//! | `sleep`      | `millis`                    | waits, then reports the time slept   |

use std::time::Duration;

use plex_codec::xml;
use plex_types::Format;
use serde_json::Value;

use crate::{DispatchError, Handler, HandlerFut, HandlerRegistry, Invocation};

pub const HELLO_WORLD: &str = "helloworld";
pub const ECHO: &str = "echo";
pub const SLEEP: &str = "sleep";

pub(crate) fn register_builtins(registry: &mut HandlerRegistry) -> Result<(), DispatchError> {
    registry.register(HELLO_WORLD, || Box::new(HelloWorld))?;
    registry.register(ECHO, || Box::new(Echo))?;
    registry.register(SLEEP, || Box::new(Sleep))?;
    Ok(())
}

/// Greets every `name` parameter when `action=sayhello`.
pub struct HelloWorld;

impl Handler for HelloWorld {
    fn name(&self) -> &'static str {
        HELLO_WORLD
    }

    fn execute<'a>(&'a mut self, call: &'a Invocation) -> HandlerFut<'a> {
        Box::pin(async move {
            match call.params().first("action") {
                Some("sayhello") => {}
                Some(other) => {
                    return Err(DispatchError::bad_params(format!(
                        "unsupported action '{other}'"
                    )));
                }
                None => return Err(DispatchError::bad_params("missing 'action' parameter")),
            }
            let mut names = call.params().get_all("name");
            let world = ["world".to_string()];
            if names.is_empty() {
                names = &world;
            }
            let greetings: Vec<String> = names.iter().map(|name| format!("Hello, {name}!")).collect();
            Ok(match call.format() {
                Format::Json => format!("\"greetings\":{}", Value::from(greetings)),
                Format::Xml => greetings
                    .iter()
                    .map(|greeting| format!("<greeting>{}</greeting>", xml::escape(greeting)))
                    .collect(),
            })
        })
    }
}

/// Returns the request payload.
pub struct Echo;

impl Handler for Echo {
    fn name(&self) -> &'static str {
        ECHO
    }

    fn execute<'a>(&'a mut self, call: &'a Invocation) -> HandlerFut<'a> {
        Box::pin(async move { Ok(call.data().unwrap_or_default().to_string()) })
    }
}

/// Sleeps for `millis` before answering.
pub struct Sleep;

impl Handler for Sleep {
    fn name(&self) -> &'static str {
        SLEEP
    }

    fn execute<'a>(&'a mut self, call: &'a Invocation) -> HandlerFut<'a> {
        Box::pin(async move {
            let raw = call.params().first("millis").unwrap_or("0");
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| DispatchError::bad_params(format!("invalid millis '{raw}'")))?;
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(match call.format() {
                Format::Json => format!("\"slept\":{millis}"),
                Format::Xml => format!("<slept>{millis}</slept>"),
            })
        })
    }
}
