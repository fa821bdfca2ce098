//! Update processing from request to journal.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use rstest::rstest;

use domain_update::base::iana::{Class, Rcode, Rtype};
use domain_update::base::name::Name;
use domain_update::base::rdata::{self, Nsec3param, Soa};
use domain_update::base::record::Record;
use domain_update::base::serial::Serial;
use domain_update::config::{ServerConfig, ZoneConfig};
use domain_update::dispatch::{Dispatcher, UpdateResponse};
use domain_update::journal::{FileJournal, MemoryJournal};
use domain_update::update::chain::{nsec3param_from_private, PrivateFlags};
use domain_update::update::{
    process, Acl, UpdateError, UpdateRequest, Zone, ZoneKind,
};
use domain_update::zonetree::{InMemoryZone, ZoneDatabase};

//------------ Helpers -------------------------------------------------------

fn init_logging() {
    // Override with env var RUST_LOG, e.g. RUST_LOG=debug.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}

fn n(s: &str) -> Name {
    Name::from_str(s).unwrap()
}

fn rr(owner: &str, class: Class, rtype: Rtype, ttl: u32, data: Bytes) -> Record {
    Record::new(n(owner), class, rtype, ttl, data)
}

fn a(owner: &str, addr: [u8; 4]) -> Record {
    rr(owner, Class::IN, Rtype::A, 300, rdata::a(Ipv4Addr::from(addr)))
}

fn soa(serial: u32) -> Bytes {
    Soa::new(
        n("ns.example"),
        n("hostmaster.example"),
        Serial(serial),
        3600,
        600,
        86400,
        300,
    )
    .compose()
}

fn database() -> InMemoryZone {
    InMemoryZone::from_records(
        n("example"),
        Class::IN,
        [
            rr("example", Class::IN, Rtype::SOA, 3600, soa(100)),
            rr(
                "example",
                Class::IN,
                Rtype::NS,
                3600,
                rdata::name(&n("ns.example")),
            ),
            a("ns.example", [192, 0, 2, 53]),
            a("host.example", [10, 0, 0, 2]),
        ],
    )
    .unwrap()
}

fn open_config() -> ZoneConfig {
    ZoneConfig {
        update_acl: Some(Acl::any()),
        ..Default::default()
    }
}

fn zone_with(config: ZoneConfig) -> (Zone, Arc<MemoryJournal>) {
    init_logging();
    let journal = Arc::new(MemoryJournal::new());
    let zone = Zone::with_journal(
        Arc::new(database()),
        ZoneKind::Primary,
        config,
        journal.clone(),
    )
    .unwrap();
    (zone, journal)
}

fn request(
    prerequisites: Vec<Record>,
    updates: Vec<Record>,
) -> UpdateRequest {
    let mut request = UpdateRequest::new(
        n("example"),
        Class::IN,
        "192.0.2.1:5353".parse().unwrap(),
    );
    request.prerequisites = prerequisites;
    request.updates = updates;
    request
}

fn data(zone: &Zone, owner: &str, rtype: Rtype) -> Vec<Bytes> {
    let db = zone.db();
    db.find_rrset(db.current_version(), &n(owner), rtype, None)
        .unwrap()
        .map(|rrset| rrset.data().to_vec())
        .unwrap_or_default()
}

fn serial(zone: &Zone) -> Serial {
    let db = zone.db();
    db.serial(db.current_version()).unwrap()
}

//------------ Scenarios -----------------------------------------------------

#[test]
fn value_dependent_prerequisite_mismatch() {
    let (zone, journal) = zone_with(open_config());
    let err = process(
        &zone,
        &request(
            vec![a("host.example", [10, 0, 0, 1]).with_ttl(0)],
            vec![a("new.example", [10, 0, 0, 9])],
        ),
    )
    .unwrap_err();
    assert!(matches!(err, UpdateError::NxRrset(..)));
    assert_eq!(err.rcode(), Some(Rcode::NXRRSET));
    assert!(data(&zone, "new.example", Rtype::A).is_empty());
    assert!(journal.transactions().is_empty());
}

#[test]
fn cname_next_to_address_is_skipped() {
    let (zone, _) = zone_with(open_config());
    let before = data(&zone, "host.example", Rtype::A);
    process(
        &zone,
        &request(
            vec![],
            vec![rr(
                "host.example",
                Class::IN,
                Rtype::CNAME,
                300,
                rdata::name(&n("elsewhere.example")),
            )],
        ),
    )
    .unwrap();
    assert_eq!(data(&zone, "host.example", Rtype::A), before);
    assert!(data(&zone, "host.example", Rtype::CNAME).is_empty());
    assert_eq!(serial(&zone), Serial(100));
}

#[test]
fn last_apex_ns_survives() {
    let (zone, _) = zone_with(open_config());
    process(
        &zone,
        &request(
            vec![],
            vec![rr(
                "example",
                Class::NONE,
                Rtype::NS,
                0,
                rdata::name(&n("ns.example")),
            )],
        ),
    )
    .unwrap();
    assert_eq!(
        data(&zone, "example", Rtype::NS),
        vec![rdata::name(&n("ns.example"))]
    );
}

#[test]
fn opposite_optout_leaves_one_pending_chain() {
    let (zone, journal) = zone_with(open_config());
    let param = |flags| Nsec3param::new(1, flags, 0, Bytes::new()).compose();
    process(
        &zone,
        &request(
            vec![],
            vec![
                rr("example", Class::IN, Rtype::NSEC3PARAM, 0, param(0)),
                rr(
                    "example",
                    Class::IN,
                    Rtype::NSEC3PARAM,
                    0,
                    param(Nsec3param::OPTOUT),
                ),
            ],
        ),
    )
    .unwrap();

    assert!(data(&zone, "example", Rtype::NSEC3PARAM).is_empty());
    let private_type = zone.config().private_type;
    let markers = data(&zone, "example", private_type);
    assert_eq!(markers.len(), 1);
    let pending = nsec3param_from_private(&markers[0]).unwrap();
    assert_eq!(pending[1] & Nsec3param::OPTOUT, Nsec3param::OPTOUT);
    assert_ne!(pending[1] & PrivateFlags::CREATE, 0);
    assert_eq!(journal.transactions().len(), 1);
}

//------------ Properties ----------------------------------------------------

#[rstest]
#[case(&[[10, 0, 0, 1], [10, 0, 0, 2]])]
#[case(&[[10, 0, 0, 2], [10, 0, 0, 1]])]
fn prerequisite_order_does_not_matter(#[case] addrs: &[[u8; 4]]) {
    let (zone, _) = zone_with(open_config());
    process(
        &zone,
        &request(vec![], vec![a("host.example", [10, 0, 0, 1])]),
    )
    .unwrap();

    let prerequisites = addrs
        .iter()
        .map(|addr| a("host.example", *addr).with_ttl(0))
        .collect();
    process(
        &zone,
        &request(prerequisites, vec![a("new.example", [10, 0, 0, 9])]),
    )
    .unwrap();
    assert_eq!(data(&zone, "new.example", Rtype::A).len(), 1);
}

#[rstest]
#[case(99)]
#[case(100)]
fn stale_soa_serial_is_ignored(#[case] stale: u32) {
    let (zone, journal) = zone_with(open_config());
    process(
        &zone,
        &request(
            vec![],
            vec![rr("example", Class::IN, Rtype::SOA, 3600, soa(stale))],
        ),
    )
    .unwrap();
    assert_eq!(serial(&zone), Serial(100));
    assert!(journal.transactions().is_empty());
}

#[test]
fn serial_advances_once_per_transaction() {
    let (zone, journal) = zone_with(open_config());
    for last in 1..=3 {
        process(
            &zone,
            &request(vec![], vec![a("new.example", [10, 0, 1, last])]),
        )
        .unwrap();
    }
    assert_eq!(serial(&zone), Serial(103));
    let serials: Vec<_> = journal
        .transactions()
        .iter()
        .map(|txn| (txn.from, txn.to))
        .collect();
    assert_eq!(
        serials,
        vec![
            (Serial(100), Serial(101)),
            (Serial(101), Serial(102)),
            (Serial(102), Serial(103)),
        ]
    );
}

#[test]
fn journaled_diff_inverts() {
    let (zone, journal) = zone_with(open_config());
    let db = zone.db();
    let before = db.records(db.current_version()).unwrap();

    process(
        &zone,
        &request(
            vec![],
            vec![
                a("host.example", [10, 0, 0, 3]).with_ttl(60),
                rr("host.example", Class::NONE, Rtype::A, 0, rdata::a(Ipv4Addr::new(10, 0, 0, 2))),
                a("new.example", [10, 0, 0, 9]),
            ],
        ),
    )
    .unwrap();
    assert_ne!(db.records(db.current_version()).unwrap(), before);

    let txn = journal.transactions().pop().unwrap();
    let version = db.new_version().unwrap();
    for tuple in txn.diff.inverse() {
        db.apply(version, &tuple).unwrap();
    }
    db.close_version(version, true).unwrap();
    assert_eq!(db.records(db.current_version()).unwrap(), before);
}

//------------ Configuration -------------------------------------------------

#[test]
fn update_policy() {
    let config: ZoneConfig = serde_json::from_str(
        r#"{
            "update_policy": [
                {
                    "grant": true,
                    "identity": "*.keys.example.",
                    "match": "subdomain",
                    "name": "dyn.example.",
                    "types": ["A(2)"]
                }
            ]
        }"#,
    )
    .unwrap();
    let (zone, _) = zone_with(config);
    let signed = |updates| {
        let mut request = request(vec![], updates);
        request.signer = Some(n("host.keys.example"));
        request
    };

    for last in 1..=3 {
        process(&zone, &signed(vec![a("www.dyn.example", [10, 0, 2, last])]))
            .unwrap();
    }
    // The third address exceeds the per-type limit.
    assert_eq!(data(&zone, "www.dyn.example", Rtype::A).len(), 2);

    let err = process(
        &zone,
        &signed(vec![rr(
            "www.dyn.example",
            Class::IN,
            Rtype::TXT,
            300,
            rdata::txt("hello"),
        )]),
    )
    .unwrap_err();
    assert_eq!(err.rcode(), Some(Rcode::REFUSED));

    let err = process(
        &zone,
        &request(vec![], vec![a("www.dyn.example", [10, 0, 2, 9])]),
    )
    .unwrap_err();
    assert_eq!(err.rcode(), Some(Rcode::REFUSED));
}

#[test]
fn record_ceiling() {
    let (zone, journal) = zone_with(ZoneConfig {
        max_records: 4,
        ..open_config()
    });
    let err = process(
        &zone,
        &request(vec![], vec![a("new.example", [10, 0, 0, 9])]),
    )
    .unwrap_err();
    assert!(matches!(err, UpdateError::TooManyRecords { count: 5, max: 4 }));
    assert_eq!(err.rcode(), Some(Rcode::REFUSED));
    assert_eq!(serial(&zone), Serial(100));
    assert!(journal.transactions().is_empty());
}

#[test]
fn file_journal() {
    init_logging();
    let path = std::env::temp_dir().join(format!(
        "domain-update-{}-file-journal.jnl",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    let config = ZoneConfig {
        journal: Some(path.clone()),
        ..open_config()
    };
    let zone = Zone::new(Arc::new(database()), ZoneKind::Primary, config)
        .unwrap();
    process(
        &zone,
        &request(vec![], vec![a("new.example", [10, 0, 0, 9])]),
    )
    .unwrap();
    process(
        &zone,
        &request(vec![], vec![a("new.example", [10, 0, 0, 10])]),
    )
    .unwrap();

    let txns = FileJournal::new(&path).read_transactions().unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(txns.len(), 2);
    assert_eq!(txns[0].to, txns[1].from);
    assert_eq!(txns[1].to, Serial(102));
}

//------------ Dispatch ------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_updates_are_serialized() {
    init_logging();
    let dispatcher = Arc::new(Dispatcher::new(ServerConfig::default()));
    let journal = Arc::new(MemoryJournal::new());
    let zone = dispatcher.add_zone(
        Zone::with_journal(
            Arc::new(database()),
            ZoneKind::Primary,
            open_config(),
            journal.clone(),
        )
        .unwrap(),
    );

    let mut tasks = Vec::new();
    for last in 1..=20u8 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            dispatcher
                .handle(request(vec![], vec![a("pool.example", [10, 0, 3, last])]))
                .await
        }));
    }
    for task in tasks {
        assert_eq!(
            task.await.unwrap(),
            UpdateResponse::Rcode(Rcode::NOERROR)
        );
    }

    assert_eq!(data(&zone, "pool.example", Rtype::A).len(), 20);
    assert_eq!(serial(&zone), Serial(120));
    let txns = journal.transactions();
    assert_eq!(txns.len(), 20);
    assert!(txns.windows(2).all(|pair| pair[0].to == pair[1].from));
    assert_eq!(dispatcher.stats().completed(), 20);
}
