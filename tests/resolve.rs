use std::collections::HashMap;

use pretty_assertions::assert_eq;

use dynsql::catalog::{ParameterCatalog, SampleValue};
use dynsql::eval::{DirectiveEvaluator, ParameterEnv};
use dynsql::extract::cast::repair_cast;
use dynsql::extract::ConstructExtractor;

fn env(pairs: &[(&str, SampleValue)]) -> ParameterEnv {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_fresh_parameter_gets_generic_sample() {
    let mut catalog = ParameterCatalog::in_memory();
    let evaluator = DirectiveEvaluator::new();

    let r = evaluator.resolve(
        &mut catalog,
        "SELECT * FROM t WHERE c = #{status,jdbcType=VARCHAR}",
    );

    assert_eq!(r.sql, "SELECT * FROM t WHERE c = 'TEST'");
    assert_eq!(
        catalog.get("status").unwrap().sample_value,
        SampleValue::Text("TEST".to_string())
    );
}

#[test]
fn test_conditional_inclusion_follows_environment() {
    let evaluator = DirectiveEvaluator::new();
    let template = r#"<if test="name != null">AND name = #{name}</if>"#;

    let mut catalog = ParameterCatalog::in_memory();
    let with_name = evaluator.resolve_with_env(
        &mut catalog,
        template,
        &env(&[("name", SampleValue::Text("X".into()))]),
    );
    assert_eq!(with_name.sql, "AND name = 'X'");

    let mut catalog = ParameterCatalog::in_memory();
    let without = evaluator.resolve_with_env(&mut catalog, template, &HashMap::new());
    assert_eq!(without.sql, "");
}

#[test]
fn test_empty_where_keeps_query_valid() {
    let mut catalog = ParameterCatalog::in_memory();
    let r = DirectiveEvaluator::new().resolve_with_env(
        &mut catalog,
        r#"SELECT * FROM t <where><if test="a != null">AND a = #{a}</if></where>"#,
        &HashMap::new(),
    );
    assert_eq!(r.sql, "SELECT * FROM t WHERE 1=1");
}

#[test]
fn test_misported_cast_repair() {
    assert_eq!(
        repair_cast("CAST(SUBSTRING(col,1,3 AS CHAR))"),
        "CAST(SUBSTRING(col,1,3) AS CHAR(255))"
    );
}

#[test]
fn test_nested_case_spans_full_text() {
    let sql = "CASE WHEN x>1 THEN 'a' ELSE CASE WHEN y<2 THEN 'b' END END AS flag_END";
    let constructs = ConstructExtractor::new().extract(sql);
    assert_eq!(constructs.len(), 1);
    assert_eq!(constructs[0].text, sql);
}

#[test]
fn test_resolution_is_idempotent() {
    let mut catalog = ParameterCatalog::in_memory();
    let evaluator = DirectiveEvaluator::new();

    let template = r#"SELECT a FROM t <where>
        <if test="status != null">AND status = #{status}</if>
        <if test="regDtm != null">AND reg_dtm > #{regDtm}</if>
    </where> ORDER BY a"#;

    let first = evaluator.resolve(&mut catalog, template);
    let second = evaluator.resolve(&mut catalog, &first.sql);
    assert_eq!(second.sql, first.sql);
    assert!(second.anomalies.is_empty());
}

#[test]
fn test_samples_survive_catalog_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("parameter_catalog.json");
    let evaluator = DirectiveEvaluator::new();
    let template = "WHERE agt_cd = #{agtCd} AND reg_dtm > #{regDtm} AND user_id = #{userId}";

    let mut catalog = ParameterCatalog::load(&store).unwrap();
    let first = evaluator.resolve(&mut catalog, template);
    catalog.flush().unwrap();

    let mut reloaded = ParameterCatalog::load(&store).unwrap();
    let second = evaluator.resolve(&mut reloaded, template);
    assert_eq!(first.sql, second.sql);
    assert_eq!(
        second.sql,
        "WHERE agt_cd = 'TEST' AND reg_dtm > '20240101000000' AND user_id = 1"
    );
}

#[test]
fn test_directive_coverage() {
    let evaluator = DirectiveEvaluator::new();
    let mut catalog = ParameterCatalog::in_memory();

    let template = r#"
        SELECT a FROM t
        <where>
            <if test="agtCd != null">AND agt_cd = #{agtCd}</if>
            <choose>
                <when test="useYn == 'Y'">AND use_yn = 'Y'</when>
                <otherwise>AND use_yn = 'N'</otherwise>
            </choose>
            AND id IN <foreach collection="listIds" item="id" separator=",">#{id}</foreach>
        </where>
    "#;

    let r = evaluator.resolve(&mut catalog, template);
    assert_eq!(
        r.sql,
        "SELECT a FROM t WHERE agt_cd = 'TEST' AND use_yn = 'Y' \
         AND id IN ('TEST1','TEST2')"
    );
    assert!(!r.sql.contains('<'));
    assert!(r.parameters.iter().any(|p| p == "agtCd"));
    assert!(r.parameters.iter().any(|p| p == "listIds"));
}

#[test]
fn test_cdata_and_entities_resolved() {
    let mut catalog = ParameterCatalog::in_memory();
    let r = DirectiveEvaluator::new().resolve_with_env(
        &mut catalog,
        r#"<if test="cnt &gt; 0">AND cnt <![CDATA[ <= ]]> #{cnt}</if>"#,
        &env(&[("cnt", SampleValue::Number(5))]),
    );
    assert_eq!(r.sql, "AND cnt <= 5");
}

#[test]
fn test_update_set_statement() {
    let mut catalog = ParameterCatalog::in_memory();
    let r = DirectiveEvaluator::new().resolve_with_env(
        &mut catalog,
        r#"UPDATE t <set>
            <if test="name != null">name = #{name},</if>
            <if test="useYn != null">use_yn = #{useYn},</if>
        </set> WHERE id = #{id}"#,
        &env(&[
            ("name", SampleValue::Text("X".into())),
            ("useYn", SampleValue::Text("Y".into())),
            ("id", SampleValue::Number(7)),
        ]),
    );
    assert_eq!(
        r.sql,
        "UPDATE t SET name = 'X', use_yn = 'Y' WHERE id = 7"
    );
}
