//! # Command Builder
//!
//! A command is a name plus binary-safe arguments. Arguments are stored as
//! `Bytes` so a sharded pipeline can regroup commands per shard without
//! copying payloads.

use bytes::Bytes;

/// Converts a value into a single RESP bulk argument.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for i64 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for u64 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for usize {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Bytes {
        if self.is_infinite() {
            let text = if self.is_sign_positive() { "+inf" } else { "-inf" };
            return Bytes::from_static(text.as_bytes());
        }
        Bytes::from(self.to_string())
    }
}

impl ToArg for bool {
    fn to_arg(&self) -> Bytes {
        Bytes::from_static(if *self { b"1" } else { b"0" })
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

/// A single store command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    keyed: bool,
    args: Vec<Bytes>,
}

impl Command {
    /// Starts a command whose first argument is the key it operates on.
    pub fn keyed(name: &'static str, key: impl ToArg) -> Self {
        Command {
            name,
            keyed: true,
            args: vec![Bytes::from_static(name.as_bytes()), key.to_arg()],
        }
    }

    /// Starts a command that addresses no key (PING, SCAN, DBSIZE...).
    pub fn keyless(name: &'static str) -> Self {
        Command {
            name,
            keyed: false,
            args: vec![Bytes::from_static(name.as_bytes())],
        }
    }

    pub fn arg(mut self, value: impl ToArg) -> Self {
        self.args.push(value.to_arg());
        self
    }

    /// Appends an argument only when present.
    pub fn arg_opt<T: ToArg>(self, value: Option<T>) -> Self {
        match value {
            Some(value) => self.arg(value),
            None => self,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The routing key, if the command addresses one.
    pub fn key(&self) -> Option<&[u8]> {
        if self.keyed {
            self.args.get(1).map(|arg| arg.as_ref())
        } else {
            None
        }
    }

    /// Full argument vector including the command name.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}

/// Optional `MATCH` / `COUNT` arguments for the SCAN family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanParams {
    pub pattern: Option<String>,
    pub count: Option<usize>,
}

impl ScanParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Appends the params to a scan command.
    pub fn apply(&self, mut command: Command) -> Command {
        if let Some(pattern) = &self.pattern {
            command = command.arg("MATCH").arg(pattern);
        }
        if let Some(count) = self.count {
            command = command.arg("COUNT").arg(count);
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_command_exposes_routing_key() {
        let cmd = Command::keyed("SETBIT", "bits_3").arg(7u64).arg(true);
        assert_eq!(cmd.name(), "SETBIT");
        assert_eq!(cmd.key(), Some(&b"bits_3"[..]));
        assert_eq!(cmd.args()[3].as_ref(), b"1");
    }

    #[test]
    fn keyless_command_has_no_key() {
        let cmd = Command::keyless("SCAN").arg("0");
        assert_eq!(cmd.key(), None);
        assert_eq!(cmd.args().len(), 2);
    }

    #[test]
    fn scan_params_append_match_and_count() {
        let cmd = ScanParams::new().pattern("user:*").count(50).apply(Command::keyless("SCAN").arg("0"));
        let args: Vec<&[u8]> = cmd.args().iter().map(|a| a.as_ref()).collect();
        assert_eq!(args, vec![&b"SCAN"[..], b"0", b"MATCH", b"user:*", b"COUNT", b"50"]);
    }

    #[test]
    fn infinite_scores_use_store_spelling() {
        assert_eq!(f64::INFINITY.to_arg().as_ref(), b"+inf");
        assert_eq!(f64::NEG_INFINITY.to_arg().as_ref(), b"-inf");
    }
}
