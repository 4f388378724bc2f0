use ranking_expression::prelude::*;
use ranking_expression::*;

fn eval(node: &NodeRef, context: &MapContext) -> Value {
    node.evaluate(context).unwrap()
}

fn context() -> MapContext {
    let _ = env_logger::builder().is_test(true).try_init();

    MapContext::new()
        .with("a", 2.0)
        .with("b", 3.0)
        .with("query(flag)", true)
        .with("attribute(title)", Value::Str("rust".to_owned()))
}

#[test]
fn arithmetic_precedence() {
    let context = context();
    // a + b * 4 - 8 / a = 2 + 12 - 4
    let node = op(
        op(op(op(ident("a"), "+", ident("b")), "*", num(4.0)), "-", num(8.0)),
        "/",
        ident("a"),
    );
    assert_eq!(node.to_string(), "a + b * 4.0 - 8.0 / a");
    assert_eq!(eval(&node, &context), Value::Double(10.0));

    let power = op(op(ident("a"), "^", ident("b")), "^", num(2.0));
    assert_eq!(eval(&power, &context), Value::Double(512.0));
    let grouped = op(embrace(op(ident("a"), "^", ident("b"))), "^", num(2.0));
    assert_eq!(eval(&grouped, &context), Value::Double(64.0));

    let modulo = op(num(7.0), "%", ident("b"));
    assert_eq!(eval(&modulo, &context), Value::Double(1.0));
}

#[test]
fn logic_and_comparison() {
    let context = context();
    let node = op(
        op(compare(ident("a"), "<", ident("b")), "&&", call("query", vec![ident("flag")])),
        "||",
        boolean(false),
    );
    assert_eq!(eval(&node, &context), Value::Boolean(true));
    assert_eq!(eval(&not(node), &context), Value::Boolean(false));
    let same_title = compare(call("attribute", vec![ident("title")]), "==", string("rust"));
    assert_eq!(eval(&same_title, &context), Value::Boolean(true));
    assert_eq!(
        eval(&compare(num(0.1 + 0.2), "~=", num(0.3)), &context),
        Value::Boolean(true)
    );
}

#[test]
fn branches() {
    let context = context();
    let node = if_(compare(ident("a"), ">", ident("b")), ident("a"), negative(ident("b")));
    assert_eq!(eval(&node, &context), Value::Double(-3.0));

    let cases = vec![(num(1.0), string("one")), (num(2.0), string("two"))];
    let node = switch(ident("a"), cases, string("many"));
    assert_eq!(eval(&node, &context), Value::Str("two".to_owned()));

    let membership = is_in(ident("b"), vec![num(1.0), num(3.0), num(5.0)]);
    assert_eq!(eval(&membership, &context), Value::Boolean(true));
    let titles = is_in(call("attribute", vec![ident("title")]), vec![string("go"), string("c")]);
    assert_eq!(eval(&titles, &context), Value::Boolean(false));
}

#[test]
fn scalar_functions() {
    let context = context();
    assert_eq!(eval(&func("pow", vec![ident("a"), ident("b")]), &context), Value::Double(8.0));
    assert_eq!(eval(&func("min", vec![ident("a"), ident("b")]), &context), Value::Double(2.0));
    assert_eq!(eval(&func("abs", vec![negative(ident("b"))]), &context), Value::Double(3.0));
    assert_eq!(eval(&func("relu", vec![num(-1.0)]), &context), Value::Double(0.0));
}

#[test]
fn user_functions_are_invoked() {
    let square = ExpressionFunction::new("square_it", ["x"], op(ident("x"), "*", ident("x")));
    let sum_of_squares = ExpressionFunction::new(
        "sum_of_squares",
        ["p", "q"],
        op(call("square_it", vec![ident("p")]), "+", call("square_it", vec![ident("q")])),
    );
    let context = context().with_function(square).with_function(sum_of_squares);
    let node = call("sum_of_squares", vec![ident("a"), ident("b")]);
    assert_eq!(eval(&node, &context), Value::Double(13.0));
}

#[test]
fn tensor_expressions() {
    let tensor_type: TensorType = "tensor(x[3])".parse().unwrap();
    let v = Tensor::dense(tensor_type.clone(), &[1.0, -2.0, 3.0]).unwrap();
    let context = context().with("v", v);

    let doubled = map(ident("v"), lambda(["c"], op(ident("c"), "*", ident("a"))));
    let expected = Tensor::dense(tensor_type, &[2.0, -4.0, 6.0]).unwrap();
    assert_eq!(eval(&doubled, &context), Value::tensor(expected));

    let total = reduce(func("relu", vec![ident("v")]), Aggregator::Sum, Vec::<String>::new());
    assert_eq!(eval(&total, &context), Value::Double(4.0));
    assert_eq!(eval(&total, &context).as_double().unwrap(), 4.0);

    let error = eval_error(&op(ident("v"), "+", call("attribute", vec![ident("title")])), &context);
    assert!(matches!(error, Error::Evaluation(_)), "{error}");
}

fn eval_error(node: &NodeRef, context: &MapContext) -> Error {
    node.evaluate(context).unwrap_err()
}

#[test]
fn missing_values_are_reported() {
    let error = eval_error(&op(ident("a"), "+", ident("unknown")), &context());
    assert!(matches!(error, Error::NotFoundError(_)));
    assert!(error.to_string().contains("unknown"), "{error}");
}
