//! The closed set of SDK flavors and their `protoc` plugin flags (spec.md
//! §4.6's generator table). Adding a row here is a schema change, same as
//! `db::entities::sdk_preference::Sdk` itself.

use std::path::Path;

use crate::db::entities::sdk_preference::Sdk;

/// `protoc` output flags for one SDK flavor, relative to `out_dir`.
pub fn output_flags(sdk: Sdk, out_dir: &Path) -> Vec<String> {
    let out = out_dir.display();
    match sdk {
        Sdk::GoProtobuf => vec![
            format!("--go_out={out}"),
            "--go_opt=paths=source_relative".to_string(),
        ],
        Sdk::GoConnectRpc => vec![
            format!("--go_out={out}"),
            "--go_opt=paths=source_relative".to_string(),
            format!("--connect-go_out={out}"),
            "--connect-go_opt=paths=source_relative".to_string(),
        ],
        Sdk::GoGrpc => vec![
            format!("--go_out={out}"),
            "--go_opt=paths=source_relative".to_string(),
            format!("--go-grpc_out={out}"),
            "--go-grpc_opt=paths=source_relative".to_string(),
        ],
        Sdk::JsBufbuildEs => vec![format!("--es_out={out}"), "--es_opt=target=ts".to_string()],
        Sdk::JsProtobuf => vec![format!(
            "--js_out=import_style=commonjs,binary:{out}"
        )],
        Sdk::JsConnectRpc => vec![
            format!("--es_out={out}"),
            "--es_opt=target=ts".to_string(),
            format!("--connect-es_out={out}"),
            "--connect-es_opt=target=ts".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn go_connect_rpc_extends_go_protobuf_flags() {
        let out = PathBuf::from("/tmp/out");
        let base = output_flags(Sdk::GoProtobuf, &out);
        let connect = output_flags(Sdk::GoConnectRpc, &out);
        assert!(connect.len() > base.len());
        assert!(connect.iter().any(|f| f.starts_with("--connect-go_out")));
    }

    #[test]
    fn js_protobuf_is_a_single_combined_flag() {
        let out = PathBuf::from("/tmp/out");
        let flags = output_flags(Sdk::JsProtobuf, &out);
        assert_eq!(flags.len(), 1);
        assert!(flags[0].contains("import_style=commonjs"));
    }
}
