//! `System.out`/`System.err`-style print-stream natives (§4.5). The receiver is a
//! sentinel `java/io/PrintStream` instance bound to the VM's output sink; there is no
//! real buffering or flushing model.

use crate::env::JavaEnv;
use crate::error::VmOutcome;
use crate::natives::format::{first_param_is_char, java_value_to_display_string_as};
use crate::value::Value;

pub const SENTINEL_CLASS: &str = "java/io/PrintStream";

pub fn dispatch(env: &JavaEnv, name: &str, descriptor: &str, args: &[Value]) -> Option<Result<Option<Value>, VmOutcome>> {
    match name {
        "println" => {
            let text = match args.first() {
                Some(v) => java_value_to_display_string_as(v, None, first_param_is_char(descriptor)),
                None => String::new(),
            };
            env.write_out(&text);
            env.write_out("\n");
            Some(Ok(None))
        }
        "print" => {
            let text = match args.first() {
                Some(v) => java_value_to_display_string_as(v, None, first_param_is_char(descriptor)),
                None => String::new(),
            };
            env.write_out(&text);
            Some(Ok(None))
        }
        "flush" | "close" => Some(Ok(None)),
        _ => None,
    }
}
