//! Property tests for command-line splitting and spec parsing.

use piowrap_core::{BuildInvocation, ExtractSpec, HostEnv, Platform};
use proptest::prelude::*;

fn host() -> HostEnv {
    HostEnv::from_parts(
        Vec::<(String, String)>::new(),
        "/bin/piowrap",
        "/work",
        Platform::Linux,
    )
}

/// Build-tool style tokens that never collide with wrapper flags.
fn arb_passthrough() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9_]{0,8}",
        "-[a-z]",
        "--[a-z][a-z-]{1,10}",
    ]
    .prop_filter("not a wrapper flag", |s| {
        !matches!(s.as_str(), "--bazel-unzip" | "--sign-key" | "--encrypt-key")
    })
}

proptest! {
    /// Anything without a colon is not an extraction spec.
    #[test]
    fn colonless_specs_are_rejected(raw in "[^:]*") {
        prop_assert_eq!(ExtractSpec::parse(&raw), None);
    }

    /// The destination is everything after the last colon.
    #[test]
    fn dest_is_after_last_colon(
        archive in "[a-zA-Z0-9_/.:]{0,12}[a-zA-Z0-9_.]",
        dest in "[a-zA-Z0-9_/.]{1,12}",
    ) {
        let spec = ExtractSpec::parse(&format!("{archive}:{dest}")).unwrap();
        prop_assert_eq!(spec.archive.to_str().unwrap(), archive.as_str());
        prop_assert_eq!(spec.dest.to_str().unwrap(), dest.as_str());
    }

    /// Wrapper flags interleaved at any position never disturb the order of
    /// the remaining arguments.
    #[test]
    fn passthrough_order_is_preserved(
        args in prop::collection::vec(arb_passthrough(), 0..12),
        positions in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
    ) {
        let mut units: Vec<Vec<String>> = args.iter().map(|a| vec![a.clone()]).collect();
        for (i, pos) in positions.iter().enumerate() {
            let at = pos.index(units.len() + 1);
            units.insert(at, vec!["--bazel-unzip".to_string(), format!("a{i}.zip:d{i}")]);
        }
        let mixed: Vec<String> = units.into_iter().flatten().collect();

        let inv = BuildInvocation::parse(mixed, &host());

        prop_assert_eq!(inv.passthrough(), args.as_slice());
        prop_assert_eq!(inv.extract_specs().len(), positions.len());
    }
}
