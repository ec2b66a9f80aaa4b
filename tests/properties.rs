use formulary::{ExpressionParsingService, Value};
use proptest::prelude::*;

proptest! {
    #[test]
    fn integer_arithmetic(a in -1000_i64..1000, b in -1000_i64..1000, c in -1000_i64..1000) {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("a - b * c + 7 - a % 3").unwrap();
        let values = [("a", Value::from(a)), ("b", Value::from(b)), ("c", Value::from(c))];
        prop_assert_eq!(
            expression.compute(&values, None),
            Ok(Value::from(a - b * c + 7 - a % 3))
        );
    }

    #[test]
    fn folding_agrees_with_evaluation(a in 0_i64..1000, b in 0_i64..1000, c in 1_i64..1000) {
        let service = ExpressionParsingService::new();
        let folded = service.interpret(&format!("({} + {}) * {} - {}", a, b, c, b)).unwrap();
        prop_assert!(folded.is_constant());
        let parameterized = service.interpret("(a + b) * c - b").unwrap();
        let values = [("a", Value::from(a)), ("b", Value::from(b)), ("c", Value::from(c))];
        prop_assert_eq!(folded.compute(&(), None), parameterized.compute(&values, None));
    }

    #[test]
    fn left_association(a in -100_i64..100, b in -100_i64..100, c in -100_i64..100) {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("a - b - c").unwrap();
        prop_assert_eq!(
            expression.compute_positional(&[Value::from(a), Value::from(b), Value::from(c)]),
            Ok(Value::from(a - b - c))
        );
    }
}
