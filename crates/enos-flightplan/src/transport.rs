// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote host transports.
//!
//! The `enos` provider describes how to reach hosts:
//!
//! ```hcl
//! provider "enos" "ubuntu" {
//!   transport = {
//!     ssh = {
//!       user             = "ubuntu"
//!       private_key_path = "./support/key.pem"
//!     }
//!   }
//! }
//! ```

use enos_hcl::{Diagnostic, Diagnostics, Type, Value};
use serde::Serialize;
use std::path::Path;

use crate::provider::Provider;

/// Provider type that carries a transport.
pub const ENOS_PROVIDER_TYPE: &str = "enos";

/// A named transport configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transport {
    /// Name of the provider the transport came from.
    pub name: String,
    /// SSH settings.
    pub ssh: TransportSsh,
}

/// SSH transport settings. Unset fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportSsh {
    /// Login user.
    pub user: String,
    /// Host address.
    pub host: String,
    /// Private key contents.
    pub private_key: String,
    /// Absolute path to the private key.
    pub private_key_path: String,
    /// Private key passphrase.
    pub passphrase: String,
    /// Absolute path to a file holding the passphrase.
    pub passphrase_path: String,
}

impl Transport {
    /// Reads the transport of an `enos` provider. Returns `None` for other
    /// providers and for providers without a `transport` attribute.
    pub fn from_provider(provider: &Provider, base_dir: &Path) -> (Option<Transport>, Diagnostics) {
        if provider.provider_type != ENOS_PROVIDER_TYPE {
            return (None, Diagnostics::new());
        }
        let Some(val) = provider.config.attrs.get("transport") else {
            return (None, Diagnostics::new());
        };
        let (transport, diags) = Transport::decode_value(&provider.alias, val, base_dir);
        (Some(transport), diags)
    }

    /// Decodes a `{ ssh = { ... } }` value. Relative paths are expanded
    /// against `base_dir`.
    pub fn decode_value(name: &str, val: &Value, base_dir: &Path) -> (Transport, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut t = Transport {
            name: name.to_string(),
            ..Transport::default()
        };

        let Some(fields) = val.as_value_map() else {
            if !val.is_null() {
                diags.push(Diagnostic::error(
                    "invalid transport",
                    format!("transport must be an object, got {}", val.type_name()),
                ));
            }
            return (t, diags);
        };

        for (key, v) in fields {
            if key != "ssh" {
                diags.push(Diagnostic::error(
                    "Unsupported attribute",
                    format!("'{}' is not a supported transport", key),
                ));
                continue;
            }

            let Some(ssh) = v.as_value_map() else {
                if !v.is_null() {
                    diags.push(Diagnostic::error(
                        "invalid transport",
                        format!("ssh transport must be an object, got {}", v.type_name()),
                    ));
                }
                continue;
            };

            for (k, sv) in ssh {
                let dst = match k.as_str() {
                    "user" => &mut t.ssh.user,
                    "host" => &mut t.ssh.host,
                    "private_key" => &mut t.ssh.private_key,
                    "private_key_path" => &mut t.ssh.private_key_path,
                    "passphrase" => &mut t.ssh.passphrase,
                    "passphrase_path" => &mut t.ssh.passphrase_path,
                    other => {
                        diags.push(Diagnostic::error(
                            "Unsupported attribute",
                            format!("'{}' is not a supported attribute", other),
                        ));
                        continue;
                    }
                };

                if sv.is_null() || !sv.is_wholly_known() {
                    continue;
                }
                match sv.as_str() {
                    Some(s) => *dst = s.to_string(),
                    None => diags.push(Diagnostic::error(
                        "value must be a string",
                        format!("ssh {} is {}", k, sv.type_name()),
                    )),
                }
            }
        }

        t.ssh.private_key_path = expand_path(base_dir, &t.ssh.private_key_path);
        t.ssh.passphrase_path = expand_path(base_dir, &t.ssh.passphrase_path);

        (t, diags)
    }

    /// The transport as an object value with `name` and `ssh`.
    pub fn to_value(&self) -> Value {
        let ssh = [
            ("user", &self.ssh.user),
            ("host", &self.ssh.host),
            ("private_key", &self.ssh.private_key),
            ("private_key_path", &self.ssh.private_key_path),
            ("passphrase", &self.ssh.passphrase),
            ("passphrase_path", &self.ssh.passphrase_path),
        ]
        .into_iter()
        .map(|(k, v)| {
            let val = if v.is_empty() {
                Value::Null(Type::String)
            } else {
                Value::string(v)
            };
            (k, val)
        });

        Value::object_from([
            ("name", Value::string(&self.name)),
            ("ssh", Value::object_from(ssh)),
        ])
    }
}

fn expand_path(base_dir: &Path, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return path.to_string();
    }
    base_dir.join(p).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemaless_block::SchemalessBlock;
    use std::collections::BTreeMap;

    fn enos_provider(transport: Value) -> Provider {
        Provider {
            provider_type: ENOS_PROVIDER_TYPE.to_string(),
            alias: "ubuntu".to_string(),
            config: SchemalessBlock {
                attrs: BTreeMap::from([("transport".to_string(), transport)]),
                ..SchemalessBlock::default()
            },
        }
    }

    #[test]
    fn test_from_enos_provider() {
        let p = enos_provider(Value::object_from([(
            "ssh",
            Value::object_from([
                ("user", Value::string("ubuntu")),
                ("private_key_path", Value::string("./key.pem")),
                ("passphrase_path", Value::string("/abs/pass")),
            ]),
        )]));

        let (t, diags) = Transport::from_provider(&p, Path::new("/base"));
        assert!(diags.is_empty(), "{}", diags);
        let t = t.unwrap();
        assert_eq!(t.name, "ubuntu");
        assert_eq!(t.ssh.user, "ubuntu");
        assert_eq!(t.ssh.private_key_path, "/base/./key.pem");
        assert_eq!(t.ssh.passphrase_path, "/abs/pass");
        assert!(t.to_value().get_attr("ssh").unwrap().get_attr("host").unwrap().is_null());
    }

    #[test]
    fn test_other_providers_have_no_transport() {
        let mut p = enos_provider(Value::empty_object());
        p.provider_type = "aws".to_string();
        let (t, _) = Transport::from_provider(&p, Path::new("/"));
        assert!(t.is_none());
    }

    #[test]
    fn test_invalid_transport() {
        let p = enos_provider(Value::object_from([(
            "ssh",
            Value::object_from([("port", Value::number(22.0)), ("user", Value::Bool(true))]),
        )]));
        let (_, diags) = Transport::from_provider(&p, Path::new("/"));
        assert_eq!(diags.errors().count(), 2);

        let p = enos_provider(Value::object_from([("winrm", Value::empty_object())]));
        let (_, diags) = Transport::from_provider(&p, Path::new("/"));
        assert!(diags.has_errors());
    }
}
