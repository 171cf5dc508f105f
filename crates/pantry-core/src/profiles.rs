//! Ingestion profiles, one per content category.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Settings;
use crate::error::IngestError;
use crate::ingest::PromptTemplate;

/// Everything a run needs to know about one content category.
#[derive(Debug, Clone)]
pub struct IngestionProfile {
    pub name: String,
    pub directory: PathBuf,
    pub template: PromptTemplate,
    pub required_fields: Vec<String>,
    /// Artifacts kept per directory name after each run
    pub max_artifacts: usize,
}

impl IngestionProfile {
    pub fn new(
        name: &str,
        directory: impl Into<PathBuf>,
        prompt: &str,
        required_fields: &[&str],
        max_artifacts: usize,
    ) -> Result<Self, IngestError> {
        let template = PromptTemplate::new(prompt).map_err(|e| match e {
            IngestError::MissingPrompt(_) => IngestError::MissingPrompt(name.to_string()),
            other => other,
        })?;

        Ok(Self {
            name: name.to_string(),
            directory: directory.into(),
            template,
            required_fields: required_fields.iter().map(|f| f.to_string()).collect(),
            max_artifacts: max_artifacts.max(1),
        })
    }

    /// Artifacts are named after the last component of the directory.
    pub fn artifact_basename(&self) -> String {
        self.directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            name: self.name.clone(),
            directory: self.directory.to_string_lossy().into_owned(),
            required_fields: self.required_fields.clone(),
            max_artifacts: self.max_artifacts,
        }
    }
}

/// Serializable view of a profile for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub name: String,
    pub directory: String,
    pub required_fields: Vec<String>,
    pub max_artifacts: usize,
}

/// The configured profiles, by name.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: BTreeMap<String, IngestionProfile>,
}

impl ProfileSet {
    /// The built-in dishes, tips and starsystem profiles rooted at
    /// `content_root`, with per-profile overrides from settings applied.
    pub fn builtin(content_root: &Path, settings: &Settings) -> Result<Self, IngestError> {
        let builtins = [
            ("dishes", DISHES_PROMPT, &["name", "category", "tags", "description"][..], 10),
            ("tips", TIPS_PROMPT, &["title", "category", "tags", "summary"][..], 5),
            ("starsystem", STARSYSTEM_PROMPT, &["title", "starLevel", "dishes", "tags"][..], 3),
        ];

        let mut set = Self::default();
        for (name, prompt, required, keep) in builtins {
            let overrides = settings.profiles.get(name);
            let directory = overrides
                .and_then(|o| o.directory.clone())
                .unwrap_or_else(|| content_root.join(name));
            let keep = overrides.and_then(|o| o.max_artifacts).unwrap_or(keep);

            set.insert(IngestionProfile::new(name, directory, prompt, required, keep)?);
        }

        Ok(set)
    }

    pub fn insert(&mut self, profile: IngestionProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Result<&IngestionProfile, IngestError> {
        self.profiles
            .get(name)
            .ok_or_else(|| IngestError::UnknownProfile(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IngestionProfile> {
        self.profiles.values()
    }
}

const DISHES_PROMPT: &str = r#"
请分析以下菜品相关的markdown文件内容，并提供以下信息：
  1. 菜品名称和描述
  2. 菜品分类（基于文件路径）
  3. 星级难度（1-5星，根据文件中的★符号或复杂程度判断）
  4. 预计制作时间（根据操作步骤估算，单位：分钟）
  5. 服务人数（根据分量描述）
  6. 必备原料列表（从"必备原料和工具"部分提取）
  7. 必备工具列表（从"必备原料和工具"部分提取）
  8. 制作步骤（从"操作"部分提取，按顺序编号）
  9. 营养信息（如果有提及）
  10. 标签（根据菜品特点生成3-8个标签）
  11. 适合人群（根据难度和特点判断）
  12. 重要提示（从内容中提取注意事项）
  13. 菜品特点（根据描述总结）
  14. 季节性（根据食材判断适合的季节）
  15. 地域特色（如果有地域特色）
  16. 推荐级别（1-5星，根据制作难度和成功率评估）
  17. 制作成功率（根据难度和步骤复杂度估算，0-100%）

请以JSON格式返回结果，包含以下字段：
- name: 菜品名称
- description: 菜品描述
- category: 菜品分类（从文件路径提取）
- starLevel: 星级难度（1-5）
- estimatedTime: 预计制作时间（分钟）
- servings: 服务人数
- ingredients: 原料列表 [{ name, amount, unit, isOptional }]
- tools: 工具列表 [string]
- steps: 制作步骤 [{ stepNumber, instruction, tips, estimatedTime }]
- nutritionInfo: 营养信息 { calories, protein, carbohydrates, fat, fiber }
- tags: 标签数组
- suitableFor: 适合人群数组
- importantNotes: 重要提示数组
- features: 菜品特点数组
- season: 季节性数组
- region: 地域特色
- recommendationLevel: 推荐级别（1-5）
- successRate: 制作成功率（0-100）

文件内容：
{{content}}
"#;

const TIPS_PROMPT: &str = r#"
请分析以下烹饪相关的markdown文件内容，并提供以下信息：
  1. 文件标题和主题
  2. 内容分类（例如：基础知识、烹饪技巧、食材选择、厨房工具、菜谱制作等）
  3. 难度级别（初级、中级、高级）
  4. 关键词标签（3-8个）
  5. 内容摘要（50-100字）
  6. 适用人群（新手、有经验的厨师、专业厨师等）
  7. 重要提示或注意事项

请以JSON格式返回结果，包含以下字段：
- title: 标题
- category: 分类
- difficulty: 难度级别
- tags: 关键词标签数组
- summary: 内容摘要
- targetAudience: 适用人群
- importantNotes: 重要提示数组

文件内容：
{{content}}
"#;

const STARSYSTEM_PROMPT: &str = r#"
你是一个专业的菜谱分析师，请分析以下星级菜单的markdown文件内容。

请严格按照以下JSON格式返回结果，保持紧凑格式，不要添加任何其他文本：

{
  "title": "菜单标题",
  "starLevel": 数字(1-7),
  "dishes": [
    {
      "name": "菜品名称",
      "filePath": "文件路径",
      "category": "分类"
    }
  ],
  "difficultyDescription": "简短难度描述(20字以内)",
  "recommendedFor": ["推荐人群"],
  "tags": ["标签1", "标签2"]
}

分析要求：
1. 从文件名中提取星级信息 (1-7)
2. 解析markdown链接，提取菜品信息
3. 根据菜品路径判断分类 (如: aquatic, breakfast, meat_dish等)
4. 生成20字以内的简短难度描述
5. 推荐1个主要目标人群
6. 提供2个相关标签

文件内容：
{{content}}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileOverride;

    #[test]
    fn test_builtin_profiles() {
        let set = ProfileSet::builtin(Path::new("/content"), &Settings::default()).unwrap();

        let dishes = set.get("dishes").unwrap();
        assert_eq!(dishes.directory, PathBuf::from("/content/dishes"));
        assert_eq!(dishes.max_artifacts, 10);
        assert_eq!(
            dishes.required_fields,
            vec!["name", "category", "tags", "description"]
        );

        assert_eq!(set.get("tips").unwrap().max_artifacts, 5);
        assert_eq!(set.get("starsystem").unwrap().max_artifacts, 3);
        assert_eq!(set.iter().count(), 3);
    }

    #[test]
    fn test_prompts_render_content() {
        let set = ProfileSet::builtin(Path::new("."), &Settings::default()).unwrap();
        for profile in set.iter() {
            let prompt = profile.template.render("# 测试内容");
            assert!(prompt.contains("# 测试内容"), "{}", profile.name);
            assert!(!prompt.contains("{{content}}"), "{}", profile.name);
        }
    }

    #[test]
    fn test_overrides_apply() {
        let mut settings = Settings::default();
        settings.profiles.insert(
            "tips".to_string(),
            ProfileOverride {
                directory: Some(PathBuf::from("/elsewhere/tips")),
                max_artifacts: Some(2),
            },
        );

        let set = ProfileSet::builtin(Path::new("/content"), &settings).unwrap();
        let tips = set.get("tips").unwrap();
        assert_eq!(tips.directory, PathBuf::from("/elsewhere/tips"));
        assert_eq!(tips.max_artifacts, 2);
        assert_eq!(tips.artifact_basename(), "tips");
    }

    #[test]
    fn test_unknown_profile() {
        let set = ProfileSet::builtin(Path::new("."), &Settings::default()).unwrap();
        assert!(matches!(set.get("desserts"), Err(IngestError::UnknownProfile(_))));
    }

    #[test]
    fn test_empty_prompt_names_the_profile() {
        let err = IngestionProfile::new("custom", "/x", "", &["title"], 1).unwrap_err();
        assert!(matches!(err, IngestError::MissingPrompt(ref name) if name == "custom"));
    }
}
