//! Unit tests for trellis-indexer

use tokio_util::sync::CancellationToken;
use trellis_core::{ComponentType, FeatureValue, RelationKind, Unit, UnitStatus, WarningKind};

use crate::*;

const WORKBOOK: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<workbook version='18.1'>
  <dashboards>
    <dashboard name='Overview'>
      <repository-location id='dash-1' path='/workbooks/sales' />
      <zones>
        <zone id='1' type='layout-basic'>
          <zone id='2' name='Sales Chart' />
        </zone>
      </zones>
    </dashboard>
  </dashboards>
  <worksheets>
    <worksheet name='Sales Chart'>
      <repository-location id='vis-1' path='/workbooks/sales' />
      <table>
        <view>
          <datasources>
            <datasource caption='Superstore' name='ds-1' />
          </datasources>
          <filter class='categorical' column='[ds-1].[Region]'>
            <groupfilter function='member' member='"East"' />
          </filter>
        </view>
        <panes><pane><mark class='Bar' /></pane></panes>
      </table>
    </worksheet>
  </worksheets>
  <datasources>
    <datasource caption='Superstore' name='ds-1'>
      <connection class='federated' />
      <column caption='Profit Ratio' datatype='real' name='[Calculation_1]' role='measure'>
        <calculation class='tableau' formula='SUM([Profit]) / SUM([Sales])' />
      </column>
      <column caption='Target' datatype='real' name='[Calculation_2]' role='measure'>
        <calculation class='tableau' formula='[Calculation_1] * [Parameter 1]' />
      </column>
    </datasource>
    <datasource name='Parameters' hasconnection='false'>
      <column caption='Growth' datatype='real' name='[Parameter 1]' param-domain-type='range' value='1.1'>
        <calculation class='tableau' formula='1.1' />
      </column>
    </datasource>
  </datasources>
</workbook>"#;

fn tableau() -> PlatformSchema {
    PlatformSchema::tableau().unwrap()
}

fn split_workbook() -> Vec<Unit> {
    split(WORKBOOK.as_bytes(), &SplitConfig::default()).unwrap().units
}

/// Delegates to the schema parser but fails every unit under `segment`.
struct FailOn {
    inner: SchemaParser,
    segment: &'static str,
}

impl UnitParser for FailOn {
    fn name(&self) -> &str {
        "fail-on"
    }

    fn extract(&self, unit: &Unit, schema: &PlatformSchema) -> anyhow::Result<UnitDiscovery> {
        if unit.path.segments().iter().any(|s| s.name == self.segment) {
            anyhow::bail!("collaborator returned no usable answer");
        }
        self.inner.extract(unit, schema)
    }
}

// ── Splitter ────────────────────────────────────────────────

#[test]
fn test_split_top_level_children() {
    let outcome = split(WORKBOOK.as_bytes(), &SplitConfig::default()).unwrap();

    let listing: Vec<String> = outcome
        .units
        .iter()
        .map(|u| format!("{} {} {:?}", u.path, u.label, u.status))
        .collect();
    insta::assert_snapshot!(listing.join("\n"), @r"
    workbook/dashboards[1] workbook_1 Ok
    workbook/worksheets[2] workbook_2 Ok
    workbook/datasources[3] workbook_3 Ok
    ");
    assert!(outcome.warnings.is_empty());

    for (i, unit) in outcome.units.iter().enumerate() {
        assert_eq!(unit.index, i);
        assert_eq!(unit.payload, WORKBOOK.as_bytes()[unit.span.clone()].to_vec());
        assert_eq!(unit.size_bytes, unit.payload.len());
    }
}

#[test]
fn test_split_recurses_until_within_budget() {
    let x = "x".repeat(100);
    let doc = format!(
        "<root><group name='a'><item>{x}</item><item>{x}</item></group><small/></root>",
        x = x
    );
    let config = SplitConfig {
        size_budget: 150,
        max_depth: 10,
    };

    let outcome = split(doc.as_bytes(), &config).unwrap();
    let listing: Vec<(String, String)> = outcome
        .units
        .iter()
        .map(|u| (u.path.to_string(), u.label.clone()))
        .collect();
    assert_eq!(
        listing,
        vec![
            ("root/group[1]/item[1]".to_string(), "group_1".to_string()),
            ("root/group[1]/item[2]".to_string(), "group_2".to_string()),
        ]
    );
    for unit in &outcome.units {
        assert_eq!(unit.status, UnitStatus::Ok);
        assert!(unit.size_bytes <= config.size_budget);
        assert_eq!(unit.text().unwrap(), &doc[unit.span.clone()]);
    }
}

#[test]
fn test_split_marks_atomic_oversized_element() {
    let doc = format!("<root><blob>{}</blob><note id='n'/></root>", "z".repeat(500));
    let config = SplitConfig {
        size_budget: 100,
        max_depth: 10,
    };

    let outcome = split(doc.as_bytes(), &config).unwrap();
    assert_eq!(outcome.units.len(), 2);
    assert_eq!(outcome.units[0].status, UnitStatus::Oversized);
    assert_eq!(outcome.units[1].status, UnitStatus::Ok);
    assert_eq!(outcome.units[1].label, "root_2");

    let warning = outcome.warnings.iter().next().unwrap();
    assert_eq!(warning.kind, WarningKind::OversizedUnit);
    assert_eq!(warning.subject, "root/blob[1]");
}

#[test]
fn test_split_keeps_element_whose_children_are_all_empty() {
    let doc = format!(
        "<root><big payload='{}'><a/><b/></big><small k='1'/></root>",
        "x".repeat(300)
    );
    let config = SplitConfig {
        size_budget: 100,
        max_depth: 10,
    };

    let outcome = split(doc.as_bytes(), &config).unwrap();
    assert_eq!(outcome.units.len(), 2);
    let big = &outcome.units[0];
    assert_eq!(big.path.to_string(), "root/big[1]");
    assert_eq!(big.status, UnitStatus::Oversized);
    assert!(big.text().unwrap().starts_with("<big payload="));
    assert_eq!(outcome.units[1].path.to_string(), "root/small[2]");

    let warning = outcome.warnings.of_kind(WarningKind::OversizedUnit).next().unwrap();
    assert_eq!(warning.subject, "root/big[1]");
}

#[test]
fn test_split_keeps_root_whose_children_are_all_empty() {
    let doc = format!("<root note='{}'><a/><b/></root>", "n".repeat(50));
    let outcome = split(doc.as_bytes(), &SplitConfig::default()).unwrap();

    assert_eq!(outcome.units.len(), 1);
    assert_eq!(outcome.units[0].path.to_string(), "root");
    assert_eq!(outcome.units[0].payload, doc.as_bytes().to_vec());
}

/// Every non-empty element either lies inside a unit or encloses one.
fn assert_no_element_lost(doc: &str, config: &SplitConfig) {
    let outcome = split(doc.as_bytes(), config).unwrap();
    let parsed = crate::xml::parse(doc).unwrap();

    for node in parsed.descendants().filter(|n| n.is_element()) {
        if crate::xml::is_empty_element(node) {
            continue;
        }
        let range = node.range();
        let covered = outcome.units.iter().any(|unit| {
            let inside = unit.span.start <= range.start && range.end <= unit.span.end;
            let encloses = range.start <= unit.span.start && unit.span.end <= range.end;
            inside || encloses
        });
        assert!(
            covered,
            "<{}> at {:?} is in no unit (budget {}, depth {})",
            node.tag_name().name(),
            range,
            config.size_budget,
            config.max_depth
        );
    }
}

#[test]
fn test_split_loses_no_content() {
    let x = "x".repeat(60);
    let documents = vec![
        WORKBOOK.to_string(),
        format!("<root><big payload='{x}'><a/><b/></big><small k='1'/></root>", x = x),
        format!(
            "<root><g n='1'><e/><item>{x}</item><e2/><item k='v'/></g><solo attr='y'>text</solo><empty/></root>",
            x = x
        ),
        format!("<root note='{x}'><a/><b/></root>", x = x),
        format!(
            "<root><a><b><c>{x}</c><d/></b><e>{x}</e></a><f><g/><h>{x}</h></f></root>",
            x = x
        ),
    ];

    for doc in &documents {
        for size_budget in [10, 40, 100, 250, 1_000_000] {
            for max_depth in [0, 1, 2, 10] {
                assert_no_element_lost(doc, &SplitConfig { size_budget, max_depth });
            }
        }
    }
}

#[test]
fn test_split_stops_at_depth_ceiling() {
    let doc = format!("<root><a><b><c>{}</c></b></a></root>", "q".repeat(40));
    let config = SplitConfig {
        size_budget: 10,
        max_depth: 2,
    };

    let outcome = split(doc.as_bytes(), &config).unwrap();
    assert_eq!(outcome.units.len(), 1);
    let unit = &outcome.units[0];
    assert_eq!(unit.path.to_string(), "root/a[1]/b[1]");
    assert_eq!(unit.status, UnitStatus::DepthLimited);
    assert_eq!(outcome.warnings.of_kind(WarningKind::DepthExceeded).count(), 1);
}

#[test]
fn test_split_passes_unparsable_fragment_through() {
    // The entity is only declared in the document's DTD, so the fragment
    // cannot be parsed on its own.
    let doc = r#"<!DOCTYPE root [<!ENTITY co "Acme">]><root><group><item name="&co;">aaaaaaaaaaaaaaaaaaaa</item><item>bbbbbbbbbbbbbbbbbbbbbbbb</item></group></root>"#;
    let config = SplitConfig {
        size_budget: 20,
        max_depth: 10,
    };

    let outcome = split(doc.as_bytes(), &config).unwrap();
    assert_eq!(outcome.units.len(), 1);
    let unit = &outcome.units[0];
    assert_eq!(unit.status, UnitStatus::UnsplitMalformed);
    assert!(unit.text().unwrap().starts_with("<group>"));
    assert!(unit.text().unwrap().ends_with("</group>"));
    assert_eq!(outcome.warnings.of_kind(WarningKind::SplitFailure).count(), 1);
}

#[test]
fn test_split_malformed_document_is_one_unit() {
    let doc = b"<root><unclosed></root>";
    let outcome = split(doc, &SplitConfig::default()).unwrap();

    assert_eq!(outcome.units.len(), 1);
    assert_eq!(outcome.units[0].status, UnitStatus::UnsplitMalformed);
    assert_eq!(outcome.units[0].payload, doc.to_vec());
    assert_eq!(outcome.warnings.of_kind(WarningKind::SplitFailure).count(), 1);
}

#[test]
fn test_split_rejects_empty_document() {
    assert!(matches!(split(b"  \n\t", &SplitConfig::default()), Err(SplitError::EmptyDocument)));
    assert!(matches!(split(b"", &SplitConfig::default()), Err(SplitError::EmptyDocument)));
}

#[test]
fn test_split_is_idempotent() {
    let config = SplitConfig {
        size_budget: 200,
        max_depth: 4,
    };
    let first = split(WORKBOOK.as_bytes(), &config).unwrap();
    let second = split(WORKBOOK.as_bytes(), &config).unwrap();

    assert_eq!(first.units, second.units);
    assert_eq!(first.warnings, second.warnings);
}

#[test]
fn test_split_redeclares_namespaces_for_fragments() {
    let doc = r#"<root xmlns:t="urn:trellis:test"><t:group><t:item a="1">xxxxxxxxxx</t:item><t:item a="2">yyyyyyyyyy</t:item></t:group></root>"#;
    let config = SplitConfig {
        size_budget: 40,
        max_depth: 10,
    };

    let outcome = split(doc.as_bytes(), &config).unwrap();
    assert_eq!(outcome.units.len(), 2);
    for unit in &outcome.units {
        assert_eq!(unit.status, UnitStatus::Ok);
        assert!(
            unit.namespaces
                .iter()
                .any(|ns| ns.prefix.as_deref() == Some("t") && ns.uri == "urn:trellis:test")
        );
    }
    assert_eq!(outcome.units[1].path.to_string(), "root/group[1]/item[2]");

    // A namespaced unit still parses on its own.
    let parser = SchemaParser::new(&tableau()).unwrap();
    assert!(parser.extract(&outcome.units[0], &tableau()).is_ok());
}

#[test]
fn test_split_without_depth_keeps_whole_root() {
    let config = SplitConfig {
        size_budget: 1_000_000,
        max_depth: 0,
    };
    let outcome = split(WORKBOOK.as_bytes(), &config).unwrap();

    assert_eq!(outcome.units.len(), 1);
    assert_eq!(outcome.units[0].path.to_string(), "workbook");
    assert_eq!(outcome.units[0].status, UnitStatus::Ok);
}

// ── Schema ──────────────────────────────────────────────────

#[test]
fn test_selector_parsing() {
    let selector: Selector = "view/datasources/datasource@name".parse().unwrap();
    assert_eq!(selector.path, vec!["view", "datasources", "datasource"]);
    assert_eq!(selector.attr.as_deref(), Some("name"));
    assert_eq!(selector.to_string(), "view/datasources/datasource@name");

    let own: Selector = "@caption".parse().unwrap();
    assert!(own.path.is_empty());

    for bad in ["", "a//b", "a@", "@", "a b@c"] {
        assert!(bad.parse::<Selector>().is_err(), "{:?} should not parse", bad);
    }
}

#[test]
fn test_builtin_tableau_schema() {
    let schema = tableau();
    assert_eq!(schema.platform, "tableau");
    assert_eq!(schema.normalize("dashboard"), Some(ComponentType::Container));
    assert_eq!(schema.normalize("report"), Some(ComponentType::Container));
    assert_eq!(schema.normalize("Metric"), Some(ComponentType::Calculation));
    assert_eq!(schema.normalize("sprocket"), None);
    assert!(PlatformSchema::builtin("Tableau").is_some());
    assert!(PlatformSchema::builtin("qlik").is_none());
}

#[test]
fn test_schema_rejects_unmapped_kind() {
    let yaml = r#"
platform: custom
version: "1"
kinds:
  - native: widget
    identity: ["@id"]
"#;
    let err = PlatformSchema::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, SchemaError::UnmappedKind(kind) if kind == "widget"));
}

#[test]
fn test_schema_rejects_bad_pattern() {
    let yaml = r#"
platform: custom
version: "1"
kinds:
  - native: sheet
    type: visualization
    identity: ["@id"]
    relations:
      - { kind: references, target_type: datasource, by: id, selector: "@src", pattern: "([" }
"#;
    let err = PlatformSchema::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, SchemaError::InvalidPattern { .. }));
}

#[test]
fn test_toml_schema_with_aliases_drives_discovery() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cognos.toml");
    std::fs::write(
        &path,
        r#"
platform = "cognos"
version = "2"

[aliases]
report = "container"
query = "datasource"

[[kinds]]
native = "report"
identity = ["@storeID", "@name"]
name = ["@name"]

[[kinds.relations]]
kind = "uses_datasource"
target_type = "datasource"
by = "name"
selector = "queryRef@name"

[[kinds]]
native = "query"
identity = ["@name"]
"#,
    )
    .unwrap();

    let schema = PlatformSchema::from_path(&path).unwrap();
    assert_eq!(schema.type_of(&schema.kinds[0]), Some(ComponentType::Container));

    let doc = r#"<document><report name="Sales" storeID="r-1"><queries><query name="Q1"/></queries><queryRef name="Q1"/></report></document>"#;
    let units = split(doc.as_bytes(), &SplitConfig::default()).unwrap().units;
    let parser = SchemaParser::new(&schema).unwrap();
    let found = discover(&units, &schema, &parser, &CancellationToken::new());

    let report = found.table.get("r-1").unwrap();
    assert_eq!(report.native_type, "report");
    assert_eq!(report.component_type, ComponentType::Container);
    assert!(found.graph.has_edge_between("r-1", "Q1", RelationKind::UsesDatasource));
    assert!(found.warnings.is_empty());
}

#[test]
fn test_schema_from_unknown_extension() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("schema.ini");
    std::fs::write(&path, "platform=x").unwrap();

    assert!(matches!(
        PlatformSchema::from_path(&path),
        Err(SchemaError::UnsupportedFormat(ext)) if ext == "ini"
    ));
}

// ── Parser ──────────────────────────────────────────────────

#[test]
fn test_schema_parser_reads_worksheet_unit() {
    let schema = tableau();
    let parser = SchemaParser::new(&schema).unwrap();
    let units = split_workbook();

    let discovery = parser.extract(&units[1], &schema).unwrap();
    let kinds: Vec<(&str, Option<ComponentType>)> = discovery
        .components
        .iter()
        .map(|c| (c.native_type.as_str(), c.component_type))
        .collect();
    // The datasource under <view> is a reference, not a definition.
    assert_eq!(
        kinds,
        vec![
            ("worksheet", Some(ComponentType::Visualization)),
            ("filter", Some(ComponentType::Filter)),
        ]
    );

    let worksheet = &discovery.components[0];
    assert_eq!(worksheet.display_name.as_deref(), Some("Sales Chart"));
    assert_eq!(worksheet.features["mark_classes"], FeatureValue::List(vec!["Bar".into()]));
    assert_eq!(worksheet.features["filter_count"], FeatureValue::Scalar("1".into()));

    assert!(discovery.relations.contains(&RawRelation {
        from: 0,
        to: RefKey::Id("ds-1".into()),
        kind: RelationKind::UsesDatasource,
        target_type: ComponentType::Datasource,
        soft: false,
    }));
    assert!(discovery.relations.contains(&RawRelation {
        from: 0,
        to: RefKey::Local(1),
        kind: RelationKind::Filters,
        target_type: ComponentType::Filter,
        soft: false,
    }));
    assert!(discovery.relations.contains(&RawRelation {
        from: 1,
        to: RefKey::Id("ds-1".into()),
        kind: RelationKind::UsesDatasource,
        target_type: ComponentType::Datasource,
        soft: true,
    }));
}

#[test]
fn test_parse_never_raises() {
    let schema = tableau();
    let parser = SchemaParser::new(&schema).unwrap();
    let mut unit = split_workbook().remove(0);
    unit.payload = b"<dashboards><dashboard".to_vec();

    let (discovery, failure) = parser.parse(&unit, &schema);
    assert!(discovery.components.is_empty());
    let failure = failure.unwrap();
    assert_eq!(failure.unit_path, "workbook/dashboards[1]");
    assert!(failure.message.contains("not well-formed"));
}

// ── Discovery ───────────────────────────────────────────────

#[test]
fn test_discover_resolves_names_across_units() {
    let schema = tableau();
    let parser = SchemaParser::new(&schema).unwrap();
    let units = split_workbook();

    let found = discover(&units, &schema, &parser, &CancellationToken::new());
    assert_eq!(found.units_processed, 3);
    assert!(!found.cancelled);
    assert!(found.warnings.is_empty(), "{:?}", found.warnings);

    let ids: Vec<&str> = found.table.ids().collect();
    assert_eq!(
        ids,
        vec![
            "Parameters",
            "[Calculation_1]",
            "[Calculation_2]",
            "[Parameter 1]",
            "[ds-1].[Region]",
            "dash-1",
            "ds-1",
            "vis-1",
        ]
    );

    let contains = found.graph.edges_from("dash-1");
    assert_eq!(contains.len(), 1);
    assert_eq!(contains[0].to_id, "vis-1");
    assert_eq!(contains[0].relation_kind, RelationKind::Contains);
    assert_eq!(contains[0].reference.as_deref(), Some("Sales Chart"));

    assert!(found.graph.has_edge_between("vis-1", "ds-1", RelationKind::UsesDatasource));
    assert!(found.graph.has_edge_between("vis-1", "[ds-1].[Region]", RelationKind::Filters));
    assert!(found.graph.has_edge_between("[Calculation_1]", "ds-1", RelationKind::UsesDatasource));
    assert!(found.graph.has_edge_between("[Calculation_2]", "[Calculation_1]", RelationKind::UsesCalculation));
    assert!(found.graph.has_edge_between("[Calculation_2]", "[Parameter 1]", RelationKind::ParameterizedBy));
    // [Profit] and [Sales] are plain columns, not components.
    assert_eq!(found.graph.edges_from("[Calculation_1]").len(), 1);
    assert_eq!(found.graph.dangling_edges().count(), 0);

    let calc = found.table.get("[Calculation_1]").unwrap();
    assert_eq!(calc.display_name, "Profit Ratio");
    assert_eq!(calc.native_type, "column");
    assert_eq!(calc.unit_ref.unit_path, "workbook/datasources[3]");

    let index = found.index();
    assert_eq!(index["vis-1"].unit_index, 1);
    assert_eq!(index["vis-1"].feature_summary["mark_classes"], "1 item(s)");
}

#[test]
fn test_discover_missing_unit_leaves_dangling_name() {
    let schema = tableau();
    let parser = FailOn {
        inner: SchemaParser::new(&schema).unwrap(),
        segment: "worksheets",
    };
    let units = split_workbook();

    let found = discover(&units, &schema, &parser, &CancellationToken::new());
    assert!(found.table.get("vis-1").is_none());
    assert_eq!(found.warnings.of_kind(WarningKind::DiscoveryFailure).count(), 1);

    let dangling: Vec<_> = found.graph.dangling_edges().collect();
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].from_id, "dash-1");
    assert_eq!(dangling[0].to_id, "unresolved:Sales Chart");
    assert_eq!(dangling[0].reference.as_deref(), Some("Sales Chart"));

    let unresolved: Vec<_> = found.warnings.of_kind(WarningKind::UnresolvedReference).collect();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].subject, "Sales Chart");
}

#[test]
fn test_discover_flags_identity_problems() {
    let doc = r#"<workbook>
  <dashboards><dashboard name='Overview'><zones/></dashboard></dashboards>
  <worksheets><worksheet name='Overview'/><worksheet><table/></worksheet></worksheets>
</workbook>"#;
    let schema = tableau();
    let parser = SchemaParser::new(&schema).unwrap();
    let units = split(doc.as_bytes(), &SplitConfig::default()).unwrap().units;

    let found = discover(&units, &schema, &parser, &CancellationToken::new());
    assert_eq!(found.table.len(), 1);
    assert_eq!(found.table.get("Overview").unwrap().component_type, ComponentType::Container);
    assert_eq!(found.warnings.of_kind(WarningKind::IdentityConflict).count(), 1);
    assert_eq!(found.warnings.of_kind(WarningKind::MissingIdentity).count(), 1);
}

#[test]
fn test_discover_flags_shared_display_name() {
    let doc = r#"<workbook>
  <dashboards><dashboard name='Overview'><zones><zone id='1' name='Sales' /></zones></dashboard></dashboards>
  <worksheets>
    <worksheet name='Sales'><repository-location id='vis-1' /></worksheet>
    <worksheet name='Sales'><repository-location id='vis-2' /></worksheet>
  </worksheets>
</workbook>"#;
    let schema = tableau();
    let parser = SchemaParser::new(&schema).unwrap();
    let units = split(doc.as_bytes(), &SplitConfig::default()).unwrap().units;

    let found = discover(&units, &schema, &parser, &CancellationToken::new());
    assert!(found.table.get("vis-1").is_some());
    assert!(found.table.get("vis-2").is_some());
    assert!(found.graph.has_edge_between("Overview", "vis-1", RelationKind::Contains));

    let ambiguous: Vec<_> = found.warnings.of_kind(WarningKind::AmbiguousName).collect();
    assert_eq!(ambiguous.len(), 1);
    assert_eq!(ambiguous[0].subject, "Sales");
    assert!(ambiguous[0].message.contains("vis-2"));
}

#[test]
fn test_discover_merges_duplicate_definitions() {
    let doc = r#"<workbook>
  <datasources><datasource name='ds-1' caption='Sales'><connection class='excel-direct'/></datasource></datasources>
  <extra><datasource name='ds-1' caption='Sales (copy)'><connection class='sqlserver'/></datasource></extra>
</workbook>"#;
    let schema = tableau();
    let parser = SchemaParser::new(&schema).unwrap();
    let units = split(doc.as_bytes(), &SplitConfig::default()).unwrap().units;

    let found = discover(&units, &schema, &parser, &CancellationToken::new());
    let ds = found.table.get("ds-1").unwrap();
    assert_eq!(ds.display_name, "Sales");
    assert_eq!(ds.raw_attributes["caption"], "Sales");
    assert_eq!(ds.features["connection_class"], FeatureValue::Scalar("excel-direct".into()));
    assert_eq!(ds.seen_in_units, vec![0, 1]);
}

#[test]
fn test_discover_honours_cancellation() {
    let schema = tableau();
    let parser = SchemaParser::new(&schema).unwrap();
    let units = split_workbook();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let found = discover(&units, &schema, &parser, &cancel);
    assert!(found.cancelled);
    assert_eq!(found.units_processed, 0);
    assert!(found.table.is_empty());
    assert_eq!(found.warnings.of_kind(WarningKind::Cancelled).count(), 1);
}
