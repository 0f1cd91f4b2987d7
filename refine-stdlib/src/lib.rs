#![forbid(unsafe_code)]

//! The static signature table shared by every verification run: builtin
//! operators, uninterpreted symbols and primitive array/pair operations.

use refine_ast::{Env, Origin, RefinedType, Refinement, Signature, Type, TypedExpr};

pub fn array() -> Type {
    Type::app("array", vec![Type::int()])
}

pub fn pair() -> Type {
    Type::app("pair", vec![Type::int(), Type::int()])
}

fn int(name: &str) -> TypedExpr {
    TypedExpr::var(name, Type::int())
}

fn op(name: &str, args: Vec<TypedExpr>, ty: Type) -> TypedExpr {
    TypedExpr::call(name, args, ty)
}

fn length(of: &str) -> TypedExpr {
    op("length", vec![TypedExpr::var(of, array())], Type::int())
}

fn plain(ty: Type) -> RefinedType {
    RefinedType::plain(ty)
}

fn bound(name: &str, ty: Type) -> RefinedType {
    RefinedType::refined(ty, Refinement::bind(name))
}

fn holds(name: &str, ty: Type, pred: TypedExpr) -> RefinedType {
    RefinedType::refined(ty, Refinement::holds(name, pred))
}

/// `0 <= i && i < length(a)`
fn in_bounds(i: &str, a: &str) -> TypedExpr {
    op(
        "&&",
        vec![
            op("<=", vec![TypedExpr::int(0), int(i)], Type::bool()),
            op("<", vec![int(i), length(a)], Type::bool()),
        ],
        Type::bool(),
    )
}

fn builtins(env: Env) -> Env {
    let int2 = || vec![plain(Type::int()), plain(Type::int())];
    let bool2 = || vec![plain(Type::bool()), plain(Type::bool())];
    let nonzero = || {
        holds(
            "y",
            Type::int(),
            op("!=", vec![int("y"), TypedExpr::int(0)], Type::bool()),
        )
    };

    let mut env = env;
    for name in ["+", "-", "*"] {
        env = env.with(name, Signature::new(Origin::Builtin, int2(), plain(Type::int())));
    }
    for name in ["/", "%"] {
        env = env.with(
            name,
            Signature::new(
                Origin::Builtin,
                vec![plain(Type::int()), nonzero()],
                plain(Type::int()),
            ),
        );
    }
    for name in ["<", "<=", ">", ">=", "==", "!="] {
        env = env.with(name, Signature::new(Origin::Builtin, int2(), plain(Type::bool())));
    }
    for name in ["&&", "||", "=>"] {
        env = env.with(name, Signature::new(Origin::Builtin, bool2(), plain(Type::bool())));
    }
    env.with(
        "!",
        Signature::new(Origin::Builtin, vec![plain(Type::bool())], plain(Type::bool())),
    )
    .with(
        "unary-",
        Signature::new(Origin::Builtin, vec![plain(Type::int())], plain(Type::int())),
    )
}

fn uninterpreted(env: Env) -> Env {
    env.with(
        "length",
        Signature::new(
            Origin::Uninterpreted,
            vec![plain(array())],
            holds(
                "n",
                Type::int(),
                op(">=", vec![int("n"), TypedExpr::int(0)], Type::bool()),
            ),
        ),
    )
    .with(
        "prime",
        Signature::new(Origin::Uninterpreted, vec![plain(Type::int())], plain(Type::bool())),
    )
    .with(
        "fst",
        Signature::new(Origin::Uninterpreted, vec![plain(pair())], plain(Type::int())),
    )
    .with(
        "snd",
        Signature::new(Origin::Uninterpreted, vec![plain(pair())], plain(Type::int())),
    )
}

fn primitives(env: Env) -> Env {
    let nat = |name: &str| {
        holds(
            name,
            Type::int(),
            op(">=", vec![int(name), TypedExpr::int(0)], Type::bool()),
        )
    };
    let same_length = |r: &str, a: &str| {
        RefinedType::refined(
            array(),
            Refinement::holds(
                r,
                op("==", vec![length(r), length(a)], Type::bool()),
            ),
        )
    };

    env.with(
        "alloc",
        Signature::new(
            Origin::Primitive,
            vec![nat("n")],
            RefinedType::refined(
                array(),
                Refinement::holds("a", op("==", vec![length("a"), int("n")], Type::bool())),
            ),
        ),
    )
    .with(
        "get",
        Signature::new(
            Origin::Primitive,
            vec![
                bound("a", array()),
                holds("i", Type::int(), in_bounds("i", "a")),
            ],
            plain(Type::int()),
        ),
    )
    .with(
        "set",
        Signature::new(
            Origin::Primitive,
            vec![
                bound("a", array()),
                holds("i", Type::int(), in_bounds("i", "a")),
                plain(Type::int()),
            ],
            same_length("r", "a"),
        ),
    )
    .with(
        "copy",
        Signature::new(Origin::Primitive, vec![bound("a", array())], same_length("r", "a")),
    )
    .with(
        "pair",
        Signature::new(
            Origin::Primitive,
            vec![bound("x", Type::int()), bound("y", Type::int())],
            RefinedType::refined(
                pair(),
                Refinement::holds(
                    "p",
                    op(
                        "&&",
                        vec![
                            op(
                                "==",
                                vec![op("fst", vec![TypedExpr::var("p", pair())], Type::int()), int("x")],
                                Type::bool(),
                            ),
                            op(
                                "==",
                                vec![op("snd", vec![TypedExpr::var("p", pair())], Type::int()), int("y")],
                                Type::bool(),
                            ),
                        ],
                        Type::bool(),
                    ),
                ),
            ),
        ),
    )
    .with(
        "succ",
        Signature::new(
            Origin::Primitive,
            vec![bound("x", Type::int())],
            RefinedType::refined(
                Type::int(),
                Refinement::equals("r", op("+", vec![int("x"), TypedExpr::int(1)], Type::int())),
            ),
        ),
    )
    .with(
        "max",
        Signature::new(
            Origin::Primitive,
            vec![bound("x", Type::int()), bound("y", Type::int())],
            holds(
                "m",
                Type::int(),
                op(
                    "&&",
                    vec![
                        op(">=", vec![int("m"), int("x")], Type::bool()),
                        op(">=", vec![int("m"), int("y")], Type::bool()),
                    ],
                    Type::bool(),
                ),
            ),
        ),
    )
}

/// Builtins, uninterpreted symbols and primitives.
pub fn prelude() -> Env {
    primitives(uninterpreted(builtins(Env::new())))
}
