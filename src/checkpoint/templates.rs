//! Generated test-file templates for new checkpoints.
//!
//! Template selection inspects the step's dependency list: when a UI
//! framework and its companion test-utilities package are both present, the
//! framework-specific template is used; otherwise the default spec template.

use crate::store::models::Dependency;

pub const DEFAULT_TEST: &str = r#"import { core, enzyme } from 'codeamigo-jest-lite'

const { describe, it, run, expect } = core
const { mount } = enzyme

describe('My Test', () => {
  it('runs', () => {
    expect(true).toBe(true)
  })
})

const runTests = async () => {
  const results = await run()
  console.test(results)
}

runTests()
"#;

pub const VUE_TEST: &str = r#"import { core, enzyme } from 'codeamigo-jest-lite'

const { describe, it, run, expect } = core
import { mount } from '@vue/test-utils'

import App from './App.vue'

const wrapper = mount(App)

describe('Hello vue', () => {
  it('renders', () => {
    expect(wrapper.find('div').text()).toBe('Hello Vue!')
  })
})

const runTests = async () => {
  const results = await run()
  console.test(results)
}

runTests()
"#;

/// Pick the test template for a step based on its declared dependencies.
pub fn select_template(dependencies: &[Dependency]) -> &'static str {
    let has = |name: &str| dependencies.iter().any(|d| d.package == name);
    if has("vue") && has("@vue/test-utils") {
        VUE_TEST
    } else {
        DEFAULT_TEST
    }
}

/// File name for a checkpoint's generated test module.
pub fn test_module_name(ordinal: i64) -> String {
    format!("checkpoint-{}.spec.ts", ordinal)
}
