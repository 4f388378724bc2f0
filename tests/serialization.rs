use ranking_expression::prelude::*;
use ranking_expression::serialize::{argument_type_property, script_property, type_property};
use ranking_expression::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn shared_callees_are_serialized_once() {
    init();
    let d = ExpressionFunction::new("d", ["r"], op(ident("r"), "+", num(1.0)));
    let b = ExpressionFunction::new("b", ["p"], call("d", vec![ident("p")]));
    let c = ExpressionFunction::new("c", ["q"], op(call("d", vec![ident("q")]), "*", num(2.0)));
    let session = SerializationContext::new([b, c, d]);
    let node = op(call("b", vec![num(1.0)]), "+", call("c", vec![num(1.0)]));
    let text = node.to_string_with(&session).unwrap();

    let functions = session.serialized_functions();
    assert_eq!(functions.len(), 3, "{functions:?}");
    let names: Vec<&String> = functions.keys().collect();
    assert!(names[0].starts_with("d@"));
    assert!(names[1].starts_with("b@"));
    assert!(names[2].starts_with("c@"));
    assert_eq!(functions[names[0]], "1.0 + 1.0");
    assert_eq!(functions[names[1]], format!("rankingExpression({})", names[0]));
    assert_eq!(functions[names[2]], format!("rankingExpression({}) * 2.0", names[0]));
    assert_eq!(
        text,
        format!("rankingExpression({}) + rankingExpression({})", names[1], names[2])
    );
}

#[test]
fn different_arguments_give_different_instances() {
    init();
    let f = ExpressionFunction::new("f", ["x"], op(ident("x"), "*", ident("x")));
    let session = SerializationContext::new([f]);
    let node = op(call("f", vec![ident("a")]), "-", call("f", vec![ident("b")]));
    node.to_string_with(&session).unwrap();
    let functions = session.serialized_functions();
    let texts: Vec<&str> = functions.values().map(String::as_str).collect();
    assert_eq!(texts, ["a * a", "b * b"]);
}

#[test]
fn compound_arguments_keep_their_grouping() {
    init();
    let f = ExpressionFunction::new("f", ["x"], op(ident("x"), "*", num(2.0)));
    let session = SerializationContext::new([f]);
    let arguments = [
        op(ident("a"), "+", ident("b")),
        negative(ident("c")),
        num(-1.0),
        call("attribute", vec![ident("d")]),
    ];
    let calls = arguments.into_iter().map(|argument| call("f", vec![argument]));
    let node = calls.reduce(|left, right| op(left, "+", right)).unwrap();
    node.to_string_with(&session).unwrap();
    let functions = session.serialized_functions();
    let texts: Vec<&str> = functions.values().map(String::as_str).collect();
    assert_eq!(texts, ["(a + b) * 2.0", "(-c) * 2.0", "(-1.0) * 2.0", "attribute(d) * 2.0"]);
}

#[test]
fn invocation_loops_are_errors() {
    init();
    let f = ExpressionFunction::new("f", ["x"], call("g", vec![ident("x")]));
    let g = ExpressionFunction::new("g", ["y"], op(call("f", vec![ident("y")]), "+", num(1.0)));
    let session = SerializationContext::new([f, g]);
    let error = call("f", vec![num(1.0)]).to_string_with(&session).unwrap_err();
    let Error::Cycle { path } = &error else {
        panic!("expected a cycle, got {error}");
    };
    assert_eq!(path[0], "f(1.0)");
    let last = path.last().unwrap();
    assert!(path[..path.len() - 1].contains(last), "{path:?}");
    assert!(error.to_string().starts_with("Invocation loop: f(1.0) -> "), "{error}");
}

#[test]
fn self_recursion_without_arguments_is_a_loop() {
    init();
    let f = ExpressionFunction::new("f", Vec::<String>::new(), op(ident("f"), "+", num(1.0)));
    let session = SerializationContext::new([f]);
    let error = ident("f").to_string_with(&session).unwrap_err();
    assert!(matches!(&error, Error::Cycle { path } if path == &["f", "f"]), "{error}");
}

#[test]
fn lambda_parameters_are_not_substituted() {
    init();
    let scale = ExpressionFunction::new(
        "scale",
        ["w", "x"],
        map(ident("w"), lambda(["x"], op(ident("x"), "*", num(2.0)))),
    );
    let session = SerializationContext::new([scale]);
    call("scale", vec![call("attribute", vec![ident("t")]), num(5.0)])
        .to_string_with(&session)
        .unwrap();
    let functions = session.serialized_functions();
    assert_eq!(
        functions.values().next().unwrap(),
        "map(attribute(t), f(x)(x * 2.0))"
    );
}

#[test]
fn rank_properties() {
    init();
    let tensor_type: TensorType = "tensor(x[4])".parse().unwrap();
    let embed = ExpressionFunction::new("embed", ["e"], op(ident("e"), "*", num(0.5)))
        .with_argument_type("e", tensor_type.clone())
        .with_return_type(tensor_type.clone());
    let embedded = call("embed", vec![call("query", vec![ident("e")])]);
    let score = ExpressionFunction::new("score", Vec::<String>::new(), sum(embedded, None));
    let session = SerializationContext::new([embed, score]);
    let expression = RankingExpression::new("first_phase", op(ident("score"), "+", ident("bias")));
    let properties = expression.rank_properties(&session).unwrap();

    let embed_instance = session
        .serialized_functions()
        .keys()
        .find(|name| name.starts_with("embed@"))
        .cloned()
        .unwrap();
    let expected = [
        (script_property("first_phase"), "rankingExpression(score) + bias".to_owned()),
        (script_property(&embed_instance), "query(e) * 0.5".to_owned()),
        (script_property("score"), format!("sum(rankingExpression({embed_instance}))")),
        (argument_type_property(&embed_instance, "e"), "tensor(x[4])".to_owned()),
        (type_property(&embed_instance), "tensor(x[4])".to_owned()),
    ];
    let actual: Vec<(String, String)> = properties.into_iter().collect();
    assert_eq!(actual, expected);
}

#[test]
fn sessions_are_independent() {
    init();
    let f = ExpressionFunction::new("f", Vec::<String>::new(), num(1.0));
    let first = SerializationContext::new([f.clone()]);
    let second = SerializationContext::new([f]);
    ident("f").to_string_with(&first).unwrap();
    assert_eq!(first.serialized_functions().len(), 1);
    assert!(second.serialized_functions().is_empty());
}
