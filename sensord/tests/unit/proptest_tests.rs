//! Property-based tests using proptest

use crate::support::{fleet, FakeProbe};
use proptest::prelude::*;
use sensord::sink::logfmt::format_line;
use sensord::types::{Check, Manifest, Measurement, Sample};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

fn snapshot(ids: &BTreeSet<u8>) -> Manifest {
    Manifest::from_checks(
        ids.iter()
            .map(|id| Check::new(format!("c{id}"), format!("http://c{id}.example")))
            .collect(),
    )
}

fn id_strategy() -> impl Strategy<Value = BTreeSet<u8>> {
    prop::collection::btree_set(0u8..12, 0..8)
}

// ---------------------------------------------------------------------------
// FleetRegistry::reconcile
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 任意のスナップショット列の後、稼働IDは最後のスナップショットと一致する
    #[test]
    fn reconcile_converges_to_latest_snapshot(
        snapshots in prop::collection::vec(id_strategy(), 1..8),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (registry, _rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_secs(3600));
            for ids in &snapshots {
                registry.reconcile(&snapshot(ids)).await;
            }

            let expected: Vec<String> = snapshots
                .last()
                .unwrap()
                .iter()
                .map(|id| format!("c{id}"))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            assert_eq!(registry.ids().await, expected);
            registry.stop_all().await;
        });
    }

    /// 同じスナップショットを続けて適用しても増減しない
    #[test]
    fn reconcile_twice_is_noop(
        before in id_strategy(),
        ids in id_strategy(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (registry, _rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_secs(3600));
            registry.reconcile(&snapshot(&before)).await;
            registry.reconcile(&snapshot(&ids)).await;
            let report = registry.reconcile(&snapshot(&ids)).await;
            assert!(report.is_noop());
            registry.stop_all().await;
        });
    }

    /// 追加と削除の件数は集合差と一致する（重複起動なし）
    #[test]
    fn reconcile_report_matches_set_difference(
        before in id_strategy(),
        after in id_strategy(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (registry, _rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_secs(3600));
            registry.reconcile(&snapshot(&before)).await;
            let report = registry.reconcile(&snapshot(&after)).await;

            assert_eq!(report.added.len(), after.difference(&before).count());
            assert_eq!(report.removed.len(), before.difference(&after).count());
            assert_eq!(registry.len().await, after.len());
            registry.stop_all().await;
        });
    }
}

// ---------------------------------------------------------------------------
// Manifest::from_json
// ---------------------------------------------------------------------------

proptest! {
    /// ID→URLマップ形式は全エントリをチェックに変換する
    #[test]
    fn map_manifest_keeps_every_entry(
        entries in prop::collection::btree_map("[a-z]{1,8}", "[a-z]{1,8}", 0..10),
    ) {
        let map: BTreeMap<String, String> = entries
            .iter()
            .map(|(id, host)| (id.clone(), format!("http://{host}.example")))
            .collect();
        let json = serde_json::to_vec(&map).unwrap();

        let manifest = Manifest::from_json(&json).unwrap();
        prop_assert_eq!(manifest.checks.len(), map.len());
        for check in &manifest.checks {
            prop_assert_eq!(Some(&check.url), map.get(&check.id));
        }
    }

    /// 配列形式の重複IDは先勝ちで1件になる
    #[test]
    fn list_manifest_dedups_ids(ids in prop::collection::vec(0u8..5, 0..20)) {
        let checks: Vec<Check> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| Check::new(format!("c{id}"), format!("http://{i}.example")))
            .collect();
        let json = serde_json::to_vec(&checks).unwrap();

        let manifest = Manifest::from_json(&json).unwrap();
        let unique: BTreeSet<_> = ids.iter().collect();
        prop_assert_eq!(manifest.checks.len(), unique.len());
        for check in &manifest.checks {
            let first = checks.iter().find(|c| c.id == check.id).unwrap();
            prop_assert_eq!(&check.url, &first.url);
        }
    }
}

// ---------------------------------------------------------------------------
// logfmt
// ---------------------------------------------------------------------------

proptest! {
    /// logfmt行は常に1行でcheck_idとステータスを含む
    #[test]
    fn logfmt_line_is_single_line(
        id in "[a-z0-9-]{1,16}",
        exit_status in 0i32..100,
        http_status in 0u16..600,
    ) {
        let sample = Sample::new(
            &Check::new(id.clone(), "http://x"),
            "test",
            chrono::Utc::now(),
            Measurement {
                exit_status,
                http_status,
                ..Measurement::default()
            },
        );
        let line = format_line(&sample);
        prop_assert!(!line.contains('\n'));
        let check_id_field = format!("check_id={id} ");
        let exit_status_field = format!("exit_status={exit_status} ");
        let http_status_field = format!("http_status={http_status} ");
        prop_assert!(line.starts_with("sample=true "));
        prop_assert!(line.contains(&check_id_field));
        prop_assert!(line.contains(&exit_status_field));
        prop_assert!(line.contains(&http_status_field));
    }

    /// 任意のロケーションでも1行に収まり、後続のフィールドが壊れない
    #[test]
    fn logfmt_location_never_breaks_line(location in "[ a-z=\"\n\t]{0,12}") {
        let sample = Sample::new(
            &Check::new("site", "http://x"),
            &location,
            chrono::Utc::now(),
            Measurement::default(),
        );
        let line = format_line(&sample);
        prop_assert!(!line.contains('\n'));
        prop_assert!(line.starts_with("sample=true check_id=site location="));
        prop_assert!(line.contains(" exit_status=0 http_status=0 "));
    }
}
