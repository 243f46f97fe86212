//! Built-in pattern set.
//!
//! One or more patterns per [`PatternCategory`], aimed at the usual
//! JavaScript/TypeScript upgrade chores: React 17 to 18, CommonJS to ES
//! modules, enzyme to Testing Library, webpack 1 to later releases.

use cm_core::RiskLevel;

use crate::error::PatternError;
use crate::pattern::{Matcher, MigrationPattern, PatternCategory, PatternMatch, Transform};

fn unsafe_lifecycle(m: &PatternMatch) -> String {
    format!("UNSAFE_{}", m.text())
}

/// Builds the built-in patterns in registration order.
///
/// # Errors
///
/// Returns [`PatternError::InvalidRegex`] if a built-in expression fails to
/// compile.
pub fn patterns() -> Result<Vec<MigrationPattern>, PatternError> {
    Ok(vec![
        MigrationPattern::new(
            "var-to-let",
            "var to let",
            PatternCategory::GeneralLanguage,
            Matcher::regex(r"\bvar\s+")?,
            Transform::Replace("let ".to_owned()),
        )
        .with_description("Replace function-scoped var declarations with let")
        .with_risk(RiskLevel::Low)
        .with_example("var x = 1;", "let x = 1;"),
        MigrationPattern::new(
            "require-to-import",
            "CommonJS require to ES import",
            PatternCategory::GeneralLanguage,
            Matcher::regex(r#"const\s+(\w+)\s*=\s*require\((['"][^'"]+['"])\);?"#)?,
            Transform::Template("import $1 from $2;".to_owned()),
        )
        .with_description("Convert default require calls into ES module imports")
        .with_risk(RiskLevel::Medium)
        .with_example("const fs = require('fs');", "import fs from 'fs';")
        .with_features("require()", "ES module imports"),
        MigrationPattern::new(
            "any-to-unknown",
            "any to unknown",
            PatternCategory::TypeSystem,
            Matcher::regex(r":\s*any\b")?,
            Transform::Replace(": unknown".to_owned()),
        )
        .with_description("Tighten explicit any annotations to unknown")
        .with_risk(RiskLevel::Medium)
        .with_example("function f(x: any) {}", "function f(x: unknown) {}"),
        MigrationPattern::new(
            "react-dom-render",
            "ReactDOM.render to createRoot",
            PatternCategory::UiFramework,
            Matcher::regex(r"ReactDOM\.render\(\s*([^,]+?),\s*([^)]+?)\s*\)")?,
            Transform::Template("ReactDOM.createRoot($2).render($1)".to_owned()),
        )
        .with_description("Switch legacy root rendering to the concurrent root API")
        .with_risk(RiskLevel::High)
        .with_dependencies(&["react-dom@18"])
        .with_example(
            "ReactDOM.render(<App />, container);",
            "ReactDOM.createRoot(container).render(<App />);",
        )
        .with_features("ReactDOM.render", "ReactDOM.createRoot"),
        MigrationPattern::new(
            "legacy-lifecycles",
            "Legacy lifecycle methods",
            PatternCategory::UiFramework,
            Matcher::regex(r"\b(componentWillMount|componentWillReceiveProps|componentWillUpdate)\b")?,
            Transform::Function(unsafe_lifecycle),
        )
        .with_description("Prefix legacy class lifecycle methods with UNSAFE_")
        .with_risk(RiskLevel::Medium)
        .with_example(
            "componentWillMount() {}",
            "UNSAFE_componentWillMount() {}",
        )
        .with_features("componentWillMount", "UNSAFE_ lifecycle aliases"),
        MigrationPattern::new(
            "find-dom-node",
            "findDOMNode to refs",
            PatternCategory::UiFramework,
            Matcher::regex(r"ReactDOM\.findDOMNode\(\s*this\.(\w+)\s*\)")?,
            Transform::Template("this.$1.current".to_owned()),
        )
        .with_description("Breaking: replace findDOMNode lookups with ref objects")
        .with_risk(RiskLevel::Critical)
        .with_example(
            "const el = ReactDOM.findDOMNode(this.node);",
            "const el = this.node.current;",
        )
        .with_features("ReactDOM.findDOMNode", "ref objects"),
        MigrationPattern::new(
            "enzyme-to-rtl",
            "enzyme to Testing Library",
            PatternCategory::Testing,
            Matcher::literal("import { shallow } from 'enzyme';"),
            Transform::Replace("import { render } from '@testing-library/react';".to_owned()),
        )
        .with_description("Swap the enzyme shallow renderer for Testing Library")
        .with_risk(RiskLevel::High)
        .with_dependencies(&["@testing-library/react"])
        .with_example(
            "import { shallow } from 'enzyme';",
            "import { render } from '@testing-library/react';",
        )
        .with_features("enzyme", "@testing-library/react"),
        MigrationPattern::new(
            "webkit-box-shadow",
            "Unprefixed box-shadow",
            PatternCategory::Styling,
            Matcher::regex(r"-webkit-box-shadow\s*:")?,
            Transform::Replace("box-shadow:".to_owned()),
        )
        .with_description("Drop the -webkit- prefix from box-shadow")
        .with_risk(RiskLevel::Low)
        .with_example(".a { -webkit-box-shadow: 0 0 1px; }", ".a { box-shadow: 0 0 1px; }"),
        MigrationPattern::new(
            "webpack-loaders",
            "webpack loaders to rules",
            PatternCategory::Build,
            Matcher::regex(r"\bmodule\s*:\s*\{\s*loaders\s*:")?,
            Transform::Replace("module: { rules:".to_owned()),
        )
        .with_description("Rename module.loaders to module.rules")
        .with_risk(RiskLevel::Medium)
        .with_example("module: { loaders: [] }", "module: { rules: [] }")
        .with_features("module.loaders", "module.rules"),
        MigrationPattern::new(
            "react-17-dependency",
            "React dependency bump",
            PatternCategory::Dependency,
            Matcher::regex(r#""react"\s*:\s*"\^?1[0-7]\.[0-9.]+""#)?,
            Transform::Replace(r#""react": "^18.2.0""#.to_owned()),
        )
        .with_description("Pin react to the 18.x line in package manifests")
        .with_risk(RiskLevel::Low)
        .with_dependencies(&["react@18"])
        .with_example(r#"{"react": "^16.14.0"}"#, r#"{"react": "^18.2.0"}"#),
    ])
}
