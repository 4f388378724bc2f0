use super::*;
use ast::*;
use prelude::*;

fn t(s: &str) -> TensorType {
    s.parse().unwrap()
}

/// One node of every kind.
fn all_kinds() -> Vec<NodeRef> {
    let double = || lambda(["c"], op(ident("c"), "*", num(2.0)));
    vec![
        num(1.5),
        boolean(true),
        string("text"),
        name("n"),
        ident("x"),
        call("attribute", vec![ident("a")]),
        reference(Reference::new("model", vec![], Some("out".to_owned()))),
        op(ident("a"), "+", op(ident("b"), "*", ident("c"))),
        arithmetic(num(1.0), "-", ident("d")),
        compare(ident("a"), "<=", num(2.0)),
        not(ident("a")),
        is_in(ident("a"), vec![num(1.0), string("b")]),
        negative(ident("a")),
        embrace(op(ident("a"), "-", ident("b"))),
        if_(ident("a"), num(1.0), num(2.0)),
        ExpressionNode::from(
            IfNode::with_probability(ident("a"), num(1.0), num(2.0), 0.25).unwrap(),
        )
        .into_ref(),
        switch(ident("a"), vec![(num(1.0), ident("b")), (num(2.0), ident("c"))], num(0.0)),
        func("max", vec![ident("a"), num(0.0)]),
        func("sqrt", vec![ident("a")]),
        ExpressionNode::from(double()).into_ref(),
        ExpressionNode::from(GenerateNode::new(t("tensor(x[2])"), ident("x")).unwrap()).into_ref(),
        map(ident("v"), double()),
        reduce(ident("m"), Aggregator::Avg, ["x"]),
        ExpressionNode::from(RenameNode::new(ident("m"), ["x", "y"], ["y", "x"]).unwrap())
            .into_ref(),
        sum(ident("m"), None),
        join(ident("v"), ident("w"), lambda(["p", "q"], op(ident("p"), "+", ident("q")))),
        ExpressionNode::from(MatchNode::new(ident("v"), ident("w"))).into_ref(),
        ExpressionNode::from(UnpackBitsNode::new(ident("b"), CellType::Int8, Endian::Little))
            .into_ref(),
    ]
}

#[test]
fn with_children_of_children_is_a_fixed_point() {
    for node in all_kinds() {
        let rebuilt = node.with_children(node.children()).unwrap();
        assert_eq!(rebuilt.to_string(), node.to_string(), "{}", node.kind());
        assert_eq!(rebuilt.kind(), node.kind());
    }
}

#[test]
fn with_children_rejects_a_wrong_number_of_children() {
    for node in all_kinds() {
        let mut children = node.children();
        children.push(num(0.0));
        if matches!(node.as_ref(), ExpressionNode::SetMembership(_)) {
            // any non-empty set is fine
            continue;
        }
        assert!(node.with_children(children).is_err(), "{}", node.kind());
    }
}

#[test]
fn equality_is_by_canonical_text() {
    use std::collections::HashSet;

    let operation = op(num(1.0), "+", num(2.0));
    let arithmetic = arithmetic(num(1.0), "+", num(2.0));
    assert_eq!(operation, arithmetic);
    assert_ne!(operation, embrace(op(num(1.0), "+", num(2.0))));
    let set: HashSet<NodeRef> = [operation, arithmetic, num(3.0)].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn canonical_text_of_every_kind() {
    let texts: Vec<String> = all_kinds().iter().map(|node| node.to_string()).collect();
    let expected = [
        "1.5",
        "true",
        "\"text\"",
        "n",
        "x",
        "attribute(a)",
        "model.out",
        "a + b * c",
        "1.0 - d",
        "a <= 2.0",
        "!a",
        "a in [1.0, \"b\"]",
        "-a",
        "(a - b)",
        "if (a, 1.0, 2.0)",
        "if (a, 1.0, 2.0, 0.25)",
        "switch (a) {\n   case 1.0: b,\n   case 2.0: c,\n   default: 0.0\n}",
        "max(a, 0.0)",
        "sqrt(a)",
        "f(c)(c * 2.0)",
        "tensor(x[2])(x)",
        "map(v, f(c)(c * 2.0))",
        "reduce(m, avg, x)",
        "rename(m, (x, y), (y, x))",
        "sum(m)",
        "join(v, w, f(p,q)(p + q))",
        "match(v, w)",
        "unpack_bits(b, int8, little)",
    ];
    assert_eq!(texts, expected);
}

#[test]
fn scalars_combine_with_tensors() {
    let v = Tensor::dense(t("tensor(x[3])"), &[1.0, 2.0, 3.0]).unwrap();
    let context = MapContext::new().with("v", v);
    let result = op(ident("v"), "+", num(1.0)).evaluate(&context).unwrap();
    assert_eq!(
        result,
        Value::tensor(Tensor::dense(t("tensor(x[3])"), &[2.0, 3.0, 4.0]).unwrap())
    );
    let larger = compare(ident("v"), ">", num(1.5)).evaluate(&context).unwrap();
    assert_eq!(
        larger,
        Value::tensor(Tensor::dense(t("tensor(x[3])"), &[0.0, 1.0, 1.0]).unwrap())
    );
}

#[test]
fn names_are_neither_typed_nor_evaluated() {
    let node = name("n");
    assert!(matches!(
        node.evaluate(&MapContext::new()),
        Err(Error::Unsupported { operation: "evaluation", .. })
    ));
    assert!(matches!(
        node.type_of(&MapTypeContext::new()),
        Err(Error::Unsupported { operation: "type inference", .. })
    ));
}
