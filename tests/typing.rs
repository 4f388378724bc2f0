use ranking_expression::ast::{Endian, UnpackBitsNode};
use ranking_expression::prelude::*;
use ranking_expression::*;

fn t(s: &str) -> TensorType {
    s.parse().unwrap()
}

fn types() -> MapTypeContext {
    let _ = env_logger::builder().is_test(true).try_init();

    MapTypeContext::new()
        .with_type("a", TensorType::empty())
        .with_type("query(q)", t("tensor(x[2])"))
        .with_type("attribute(d)", t("tensor(x[3])"))
        .with_type("attribute(tags)", t("tensor(tag{})"))
        .with_type("attribute(bits)", t("tensor<int8>(x[4])"))
}

#[test]
fn branches_generalize_their_alternatives() {
    let types = types();
    let query = || call("query", vec![ident("q")]);
    let node = if_(ident("a"), query(), call("attribute", vec![ident("d")]));
    assert_eq!(node.type_of(&types).unwrap(), t("tensor(x[])"));

    let incompatible = if_(ident("a"), query(), call("attribute", vec![ident("tags")]));
    let error = incompatible.type_of(&types).unwrap_err();
    assert!(
        matches!(error, Error::TypeError(TypeError::NoGeneralization { construct: "if", .. })),
        "{error}"
    );

    let scalar_and_tensor = switch(ident("a"), vec![(num(1.0), num(2.0))], query());
    assert!(scalar_and_tensor.type_of(&types).is_err());
}

#[test]
fn joins_combine_dimensions() {
    let types = types();
    let node = op(call("query", vec![ident("q")]), "*", call("attribute", vec![ident("tags")]));
    assert_eq!(node.type_of(&types).unwrap(), t("tensor(tag{},x[2])"));
    let bound = op(call("query", vec![ident("q")]), "+", call("attribute", vec![ident("d")]));
    assert_eq!(bound.type_of(&types).unwrap(), t("tensor(x[2])"));
    let comparison = compare(ident("a"), "<", num(1.0));
    assert_eq!(comparison.type_of(&types).unwrap(), TensorType::empty());
}

#[test]
fn tensor_functions() {
    let types = types();
    let product = op(
        call("query", vec![ident("q")]),
        "*",
        call("attribute", vec![ident("tags")]),
    );
    let reduced = reduce(product, Aggregator::Max, ["x"]);
    assert_eq!(reduced.type_of(&types).unwrap(), t("tensor(tag{})"));
    let summed = sum(call("attribute", vec![ident("d")]), None);
    assert_eq!(summed.type_of(&types).unwrap(), TensorType::empty());

    let unpacked = ExpressionNode::from(UnpackBitsNode::new(
        call("attribute", vec![ident("bits")]),
        CellType::default(),
        Endian::default(),
    ));
    assert_eq!(unpacked.type_of(&types).unwrap(), t("tensor<float>(x[32])"));

    let scaled = lambda(["b"], op(ident("b"), "*", ident("a")));
    let mapped = map(call("attribute", vec![ident("bits")]), scaled);
    assert_eq!(mapped.type_of(&types).unwrap(), t("tensor<float>(x[4])"));
}

#[test]
fn function_types() {
    let scale = ExpressionFunction::new("scale", ["v", "f"], op(ident("v"), "*", ident("f")));
    let declared = ExpressionFunction::new("declared", ["v"], ident("v"))
        .with_return_type(t("tensor(x[2])"));
    let types = types().with_function(scale).with_function(declared);

    let call_scale = call("scale", vec![call("attribute", vec![ident("d")]), ident("a")]);
    assert_eq!(call_scale.type_of(&types).unwrap(), t("tensor(x[3])"));

    let ok = call("declared", vec![call("query", vec![ident("q")])]);
    assert_eq!(ok.type_of(&types).unwrap(), t("tensor(x[2])"));
    let wrong = call("declared", vec![call("attribute", vec![ident("tags")])]);
    assert!(matches!(
        wrong.type_of(&types),
        Err(Error::TypeError(TypeError::Mismatch { .. }))
    ));
}

#[test]
fn unresolved_references() {
    let types = types();
    let error = op(ident("a"), "+", call("attribute", vec![ident("missing")]))
        .type_of(&types)
        .unwrap_err();
    assert!(matches!(error, Error::NotFoundError(_)));
    assert!(error.to_string().contains("attribute(missing)"), "{error}");
}
