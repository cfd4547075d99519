//! Composite actions the generated workflow calls. Their content is fixed text; only
//! the write policy in `generate` decides whether an existing copy is replaced.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTemplate {
    pub name: &'static str,
    pub content: &'static str,
}

pub fn action_templates() -> Vec<ActionTemplate> {
    vec![
        ActionTemplate {
            name: "detect-changes",
            content: DETECT_CHANGES,
        },
        ActionTemplate {
            name: "calculate-version",
            content: CALCULATE_VERSION,
        },
        ActionTemplate {
            name: "create-tag",
            content: CREATE_TAG,
        },
        ActionTemplate {
            name: "promote-branch",
            content: PROMOTE_BRANCH,
        },
        ActionTemplate {
            name: "create-release",
            content: CREATE_RELEASE,
        },
    ]
}

const DETECT_CHANGES: &str = r#"# Managed by pipeforge. Local edits are kept unless `pipeforge generate --force` runs.
name: Detect changes
description: Report which domains have files changed since the comparison base.
inputs:
  filters:
    description: One `domain=glob` pair per line.
    required: false
    default: ''
  base:
    description: Commit to compare against. Defaults to the push or pull request base.
    required: false
    default: ''
outputs:
  changes:
    description: JSON object mapping each domain to 'true' or 'false'.
    value: ${{ steps.detect.outputs.changes }}
runs:
  using: composite
  steps:
    - id: detect
      shell: bash
      env:
        FILTERS: ${{ inputs.filters }}
        BASE: ${{ inputs.base }}
        EVENT_NAME: ${{ github.event_name }}
        BASE_REF: ${{ github.base_ref }}
        BEFORE: ${{ github.event.before }}
      run: |
        set -euo pipefail
        base="$BASE"
        if [ -z "$base" ]; then
          if [ "$EVENT_NAME" = "pull_request" ]; then
            base="origin/$BASE_REF"
          else
            base="$BEFORE"
          fi
        fi
        if [ -z "$base" ] || ! git rev-parse --quiet --verify "${base}^{commit}" >/dev/null; then
          base="$(git rev-list --max-parents=0 HEAD | tail -n 1)"
        fi
        changed="$(git diff --name-only "$base" HEAD)"
        declare -A hits=()
        while IFS='=' read -r domain pattern; do
          [ -z "$domain" ] && continue
          hits[$domain]="${hits[$domain]:-false}"
          while IFS= read -r file; do
            if [ -n "$file" ] && [[ "$file" == $pattern ]]; then
              hits[$domain]=true
              break
            fi
          done <<< "$changed"
        done <<< "$FILTERS"
        json='{}'
        for domain in "${!hits[@]}"; do
          json="$(jq -c --arg d "$domain" --arg v "${hits[$domain]}" '. + {($d): $v}' <<< "$json")"
        done
        echo "changes=$json" >> "$GITHUB_OUTPUT"
"#;

const CALCULATE_VERSION: &str = r#"# Managed by pipeforge. Local edits are kept unless `pipeforge generate --force` runs.
name: Calculate version
description: Derive the next semantic version from conventional commits since the last tag.
inputs:
  override:
    description: Use this version instead of calculating one.
    required: false
    default: ''
  branch:
    description: Branch being built.
    required: true
  final-branch:
    description: Branch that produces stable releases.
    required: true
outputs:
  version:
    description: Next version, empty when nothing warrants a release.
    value: ${{ steps.calculate.outputs.version }}
runs:
  using: composite
  steps:
    - id: calculate
      shell: bash
      env:
        OVERRIDE: ${{ inputs.override }}
        BRANCH: ${{ inputs.branch }}
        FINAL_BRANCH: ${{ inputs.final-branch }}
      run: |
        set -euo pipefail
        if [ -n "$OVERRIDE" ]; then
          echo "version=$OVERRIDE" >> "$GITHUB_OUTPUT"
          exit 0
        fi
        last="$(git describe --tags --abbrev=0 --match 'v[0-9]*' 2>/dev/null || echo v0.0.0)"
        range="HEAD"
        if git rev-parse --quiet --verify "$last" >/dev/null; then
          range="$last..HEAD"
        fi
        subjects="$(git log --format=%s%n%b "$range")"
        if [ -z "$subjects" ]; then
          echo "version=" >> "$GITHUB_OUTPUT"
          exit 0
        fi
        IFS=. read -r major minor patch <<< "${last#v}"
        patch="${patch%%-*}"
        if grep -qE '^[a-z]+(\(.+\))?!:|BREAKING CHANGE' <<< "$subjects"; then
          major=$((major + 1)); minor=0; patch=0
        elif grep -qE '^feat(\(.+\))?:' <<< "$subjects"; then
          minor=$((minor + 1)); patch=0
        else
          patch=$((patch + 1))
        fi
        version="v${major}.${minor}.${patch}"
        if [ "$BRANCH" != "$FINAL_BRANCH" ]; then
          version="${version}-$(git rev-list --count HEAD)"
        fi
        echo "version=$version" >> "$GITHUB_OUTPUT"
"#;

const CREATE_TAG: &str = r#"# Managed by pipeforge. Local edits are kept unless `pipeforge generate --force` runs.
name: Create tag
description: Tag the current commit with the calculated version and push it.
inputs:
  version:
    description: Tag to create.
    required: true
runs:
  using: composite
  steps:
    - shell: bash
      env:
        VERSION: ${{ inputs.version }}
      run: |
        set -euo pipefail
        if git rev-parse --quiet --verify "refs/tags/$VERSION" >/dev/null; then
          echo "Tag $VERSION already exists"
          exit 0
        fi
        git config user.name "github-actions[bot]"
        git config user.email "41898282+github-actions[bot]@users.noreply.github.com"
        git tag -a "$VERSION" -m "Release $VERSION"
        git push origin "refs/tags/$VERSION"
"#;

const PROMOTE_BRANCH: &str = r#"# Managed by pipeforge. Local edits are kept unless `pipeforge generate --force` runs.
name: Promote branch
description: Open (and optionally auto-merge) a pull request to the next branch in the flow.
inputs:
  source-branch:
    description: Branch being promoted.
    required: true
  target-branch:
    description: Branch receiving the promotion. Nothing happens when empty.
    required: true
  auto-merge:
    description: Enable auto-merge on the pull request when 'true'.
    required: false
    default: 'false'
  version:
    description: Version being promoted.
    required: false
    default: ''
runs:
  using: composite
  steps:
    - shell: bash
      env:
        GH_TOKEN: ${{ github.token }}
        SOURCE: ${{ inputs.source-branch }}
        TARGET: ${{ inputs.target-branch }}
        AUTO_MERGE: ${{ inputs.auto-merge }}
        VERSION: ${{ inputs.version }}
      run: |
        set -euo pipefail
        if [ -z "$TARGET" ]; then
          echo "No promotion target for $SOURCE"
          exit 0
        fi
        existing="$(gh pr list --base "$TARGET" --head "$SOURCE" --state open --json number --jq '.[0].number')"
        if [ -z "$existing" ]; then
          gh pr create --base "$TARGET" --head "$SOURCE" \
            --title "Promote ${VERSION:-$SOURCE} to $TARGET" \
            --body "Automated promotion from \`$SOURCE\` to \`$TARGET\`."
          existing="$(gh pr list --base "$TARGET" --head "$SOURCE" --state open --json number --jq '.[0].number')"
        fi
        if [ "$AUTO_MERGE" = "true" ]; then
          gh pr merge "$existing" --auto --merge
        fi
"#;

const CREATE_RELEASE: &str = r#"# Managed by pipeforge. Local edits are kept unless `pipeforge generate --force` runs.
name: Create release
description: Publish a GitHub release for the calculated version.
inputs:
  version:
    description: Version to release.
    required: true
runs:
  using: composite
  steps:
    - shell: bash
      env:
        GH_TOKEN: ${{ github.token }}
        VERSION: ${{ inputs.version }}
      run: |
        set -euo pipefail
        if gh release view "$VERSION" >/dev/null 2>&1; then
          echo "Release $VERSION already exists"
          exit 0
        fi
        gh release create "$VERSION" --title "$VERSION" --generate-notes
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_cover_every_called_action() {
        let names = action_templates()
            .iter()
            .map(|template| template.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "detect-changes",
                "calculate-version",
                "create-tag",
                "promote-branch",
                "create-release"
            ]
        );
    }

    #[test]
    fn templates_are_composite_actions() {
        for template in action_templates() {
            let parsed: serde_yaml::Value =
                serde_yaml::from_str(template.content).expect("template is valid yaml");
            assert_eq!(
                parsed["runs"]["using"],
                serde_yaml::Value::String("composite".to_string()),
                "{}",
                template.name
            );
        }
    }
}
